use serde::{Deserialize, Serialize};

/// Identity of the person driving a shopping session.
///
/// Anonymous (guest) shoppers keep their purchase history in memory only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shopper {
    pub uid: String,
    pub is_anonymous: bool,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Shopper {
    pub fn guest(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), is_anonymous: true, display_name: None, email: None }
    }

    pub fn registered(uid: impl Into<String>, email: Option<String>) -> Self {
        Self { uid: uid.into(), is_anonymous: false, display_name: None, email }
    }

    pub fn salutation(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|name| !name.trim().is_empty()) {
            return name.to_string();
        }
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| "Valued Customer".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::Shopper;

    #[test]
    fn salutation_prefers_display_name_then_email_local_part() {
        let mut shopper = Shopper::registered("u-1", Some("ada@example.com".to_string()));
        assert_eq!(shopper.salutation(), "ada");

        shopper.display_name = Some("Ada Lovelace".to_string());
        assert_eq!(shopper.salutation(), "Ada Lovelace");

        assert_eq!(Shopper::guest("g-1").salutation(), "Valued Customer");
    }
}
