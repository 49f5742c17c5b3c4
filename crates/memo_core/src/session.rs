use shared::domain::UserId;

/// Identity of the signed-in user, handed to the wizard and API calls
/// explicitly instead of being read from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl Session {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Name shown next to public memos: display name, else the local part of
    /// the email address, else "Anonymous".
    pub fn public_author_name(&self) -> String {
        if let Some(name) = non_blank(self.display_name.as_deref()) {
            return name.to_string();
        }
        if let Some(local) = non_blank(self.email.as_deref()).and_then(|e| e.split('@').next()) {
            if !local.is_empty() {
                return local.to_string();
            }
        }
        "Anonymous".to_string()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
