use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use memo_core::{ImageUpload, WizardController, WizardError, WizardStep};
use shared::domain::{MemoId, RecordMode, RecordType};
use storage::Storage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::warn;

/// Line-oriented prompt over any buffered reader, stdin in practice.
pub(crate) struct Console<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> Console<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// `None` once input is exhausted.
    async fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        println!("{prompt}");
        let line = self.lines.next_line().await.context("failed to read input")?;
        Ok(line.map(|l| l.trim_end_matches('\r').to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Input {
    Text(String),
    Title(String),
    Tag(String),
    Template(usize),
    Hint(usize),
    Image(PathBuf),
    Caption(String),
    NoImage,
    Next,
    Previous,
    Review,
    Edit,
    Public,
    Save,
    Help,
    Quit,
    Unknown(String),
}

pub(crate) fn parse_input(line: &str) -> Input {
    let Some(command) = line.strip_prefix('/') else {
        return Input::Text(line.to_string());
    };
    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(n, a)| (n, a.trim()));
    match name {
        "title" => Input::Title(arg.to_string()),
        "tag" => Input::Tag(arg.to_string()),
        "tpl" => arg
            .parse()
            .map_or_else(|_| Input::Unknown(line.to_string()), Input::Template),
        "hint" => arg
            .parse()
            .map_or_else(|_| Input::Unknown(line.to_string()), Input::Hint),
        "image" if !arg.is_empty() => Input::Image(PathBuf::from(arg)),
        "caption" => Input::Caption(arg.to_string()),
        "noimage" => Input::NoImage,
        "next" => Input::Next,
        "prev" => Input::Previous,
        "review" => Input::Review,
        "edit" => Input::Edit,
        "public" => Input::Public,
        "save" => Input::Save,
        "help" => Input::Help,
        "quit" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

/// Walks the wizard from wherever it stands to a saved memo. Returns `None`
/// when the user quits or input runs out first.
pub(crate) async fn run<R: AsyncBufRead + Unpin>(
    console: &mut Console<R>,
    wizard: &mut WizardController,
    storage: &Storage,
) -> Result<Option<MemoId>> {
    if !select_categories(console, wizard).await? {
        return Ok(None);
    }
    print_help();

    loop {
        match wizard.step() {
            WizardStep::Saved { memo_id } => return Ok(Some(memo_id)),
            WizardStep::Review => render_review(wizard),
            _ => render_block(wizard),
        }
        let Some(line) = console.ask(">").await? else {
            return Ok(None);
        };

        let outcome = match parse_input(&line) {
            Input::Quit => return Ok(None),
            Input::Help => {
                print_help();
                Ok(())
            }
            Input::Unknown(raw) => {
                println!("unknown command: {raw}");
                Ok(())
            }
            Input::Text(text) => wizard.set_block_text(text),
            Input::Title(title) => wizard.set_title(title),
            Input::Tag(tag) => wizard.toggle_block_tag(&tag),
            Input::Template(number) => {
                let template = number
                    .checked_sub(1)
                    .and_then(|i| wizard.current_templates().get(i))
                    .cloned();
                match template {
                    Some(template) => wizard.apply_template(&template),
                    None => {
                        println!("no template #{number}");
                        Ok(())
                    }
                }
            }
            Input::Hint(number) => {
                let template = number
                    .checked_sub(1)
                    .and_then(|i| wizard.current_hint_templates().get(i))
                    .map(|hint| hint.template.clone());
                match template {
                    Some(template) => wizard.apply_template(&template),
                    None => {
                        println!("no hint template #{number}");
                        Ok(())
                    }
                }
            }
            Input::Image(path) => match read_image(&path).await {
                Ok(upload) => wizard
                    .attach_image(storage, upload)
                    .await
                    .map(|url| println!("uploaded {url}")),
                Err(error) => {
                    println!("{error:#}");
                    Ok(())
                }
            },
            Input::Caption(caption) => wizard.set_caption(&caption),
            Input::NoImage => wizard.clear_image(),
            Input::Next => wizard.next(),
            Input::Previous => wizard.previous(),
            Input::Review => wizard.to_review(),
            Input::Edit => wizard.back_to_edit(),
            Input::Public => wizard.toggle_public(),
            Input::Save => wizard.save(storage).await.map(|_| ()),
        };
        if let Err(error) = outcome {
            report(&error);
        }
    }
}

/// Type, mode and custom category prompts. Skipped when the wizard already
/// has a draft, as it does when revising a saved memo.
async fn select_categories<R: AsyncBufRead + Unpin>(
    console: &mut Console<R>,
    wizard: &mut WizardController,
) -> Result<bool> {
    loop {
        let Some(step) = selection_step(wizard.step()) else {
            return Ok(true);
        };
        let prompt = match step {
            WizardStep::SelectType => "record type? [building/activity]".to_string(),
            WizardStep::SelectMode => "categories? [default/custom] (/back)".to_string(),
            _ => custom_menu(wizard),
        };
        let Some(line) = console.ask(&prompt).await? else {
            return Ok(false);
        };
        let line = line.trim();
        if line == "/quit" {
            return Ok(false);
        }

        let outcome = match step {
            WizardStep::SelectType => match line.parse::<RecordType>() {
                Ok(record_type) => wizard.choose_type(record_type),
                Err(error) => {
                    println!("{error}");
                    Ok(())
                }
            },
            _ if line == "/back" => wizard.back(),
            WizardStep::SelectMode => match line.parse::<RecordMode>() {
                Ok(record_mode) => wizard.choose_mode(record_mode),
                Err(error) => {
                    println!("{error}");
                    Ok(())
                }
            },
            _ if line.is_empty() => wizard.confirm_custom_categories(),
            _ => toggle_numbered(wizard, line),
        };
        if let Err(error) = outcome {
            report(&error);
        }
    }
}

fn selection_step(step: WizardStep) -> Option<WizardStep> {
    match step {
        WizardStep::SelectType | WizardStep::SelectMode | WizardStep::SelectCustomCategories => {
            Some(step)
        }
        _ => None,
    }
}

fn custom_menu(wizard: &WizardController) -> String {
    let Some(record_type) = wizard.record_type() else {
        return String::new();
    };
    let mut menu = String::from("pick categories by number, empty line when done (/back)\n");
    for (index, name) in wizard
        .catalog()
        .custom_options(record_type)
        .iter()
        .enumerate()
    {
        let picked = match wizard.selection().iter().position(|s| s == name) {
            Some(position) => format!("[{}]", position + 1),
            None => "[ ]".to_string(),
        };
        menu.push_str(&format!("{picked} {:>2}. {name}\n", index + 1));
    }
    menu
}

/// Toggles every listed option number, e.g. `3 1, 5`.
fn toggle_numbered(wizard: &mut WizardController, line: &str) -> Result<(), WizardError> {
    let Some(record_type) = wizard.record_type() else {
        return Ok(());
    };
    let options = wizard.catalog().custom_options(record_type).to_vec();
    for token in line.split(|c: char| c == ',' || c.is_whitespace()) {
        if token.is_empty() {
            continue;
        }
        let Some(name) = token
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| options.get(i))
        else {
            println!("no option '{token}'");
            continue;
        };
        let was_selected = wizard.selection().contains(name);
        if !wizard.toggle_custom_category(name)? && !was_selected {
            println!("at most {} categories", memo_core::catalog::MAX_CUSTOM_CATEGORIES);
        }
    }
    Ok(())
}

fn render_block(wizard: &WizardController) {
    let (Some(block), Some((position, total))) = (wizard.current_block(), wizard.progress())
    else {
        return;
    };
    let title = wizard.draft().map_or("", |d| d.title.as_str());
    println!();
    println!("title: {}", if title.is_empty() { "(none)" } else { title });
    println!("[{position}/{total}] {}", block.category_name);
    if let Some(hint) = wizard.current_hint() {
        println!("  hint: {hint}");
    }
    for (index, template) in wizard.current_templates().iter().enumerate() {
        println!("  /tpl {}: {}", index + 1, template.replace('\n', " / "));
    }
    for (index, hint) in wizard.current_hint_templates().iter().enumerate() {
        println!(
            "  /hint {}: {}: {}",
            index + 1,
            hint.name,
            hint.template.replace('\n', " / ")
        );
    }
    println!("  text: {}", block.text.as_deref().unwrap_or(""));
    if !block.tags.is_empty() {
        println!("  tags: {}", block.tags.join(" "));
    }
    if let Some(url) = &block.image_url {
        println!(
            "  image: {url} {}",
            block.caption.as_deref().unwrap_or_default()
        );
    }
    println!("  tags available: {}", wizard.catalog().common_tags().join(" "));
}

fn render_review(wizard: &WizardController) {
    let Some(draft) = wizard.review() else {
        return;
    };
    println!();
    println!("== {} ==", draft.title);
    for block in &draft.blocks {
        println!(
            "- {}: {} {}",
            block.category_name,
            block.text.as_deref().unwrap_or(""),
            block.tags.join(" ")
        );
    }
    println!(
        "visibility: {} (/public to switch, /edit to go back, /save)",
        if draft.is_public { "public" } else { "private" }
    );
}

fn print_help() {
    println!(
        "type text to fill the current category; commands: /title <t> /tag <#tag> /tpl <n> \
         /hint <n> /image <path> /caption <c> /noimage /next /prev /review /edit /public /save /quit"
    );
}

fn report(error: &WizardError) {
    if error.is_retryable() {
        warn!(error = ?error, "wizard action failed");
        println!("{error}; nothing was lost, try again");
    } else {
        println!("{error}");
    }
}

pub(crate) async fn read_image(path: &Path) -> Result<ImageUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mime_type = mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string();
    Ok(ImageUpload {
        bytes,
        mime_type,
        filename: path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string),
    })
}

#[cfg(test)]
#[path = "tests/compose_tests.rs"]
mod tests;
