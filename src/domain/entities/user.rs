/// Someone on the chat platform who sent a message or pressed a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Platform id, stable across renames
    pub id: String,
    pub username: Option<String>,
    /// Human-readable name as the platform shows it
    pub name: Option<String>,
    pub is_bot: bool,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
            name: None,
            is_bot: false,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn as_bot(mut self) -> Self {
        self.is_bot = true;
        self
    }

    /// Best name to address the user by: name, then username, then id
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or(&self.id)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(User::new("42").display_name(), "42");
        assert_eq!(User::new("42").with_username("ann").display_name(), "ann");
        assert_eq!(
            User::new("42").with_username("ann").with_name("Ann Lee").display_name(),
            "Ann Lee"
        );
    }
}
