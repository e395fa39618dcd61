use serde::{ Deserialize, Serialize };

/// Shown when the requesting side did not provide a usable value.
pub const UNSPECIFIED: &str = "Non spécifié";

/// Withdrawal details attached to a transaction by the requesting side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalPayload {
    /// `None` when the blob was missing or unparseable.
    pub payment_method: Option<String>,
    pub account_name: String,
    pub phone_number: String,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    account_name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

impl Default for WithdrawalPayload {
    fn default() -> Self {
        Self {
            payment_method: None,
            account_name: UNSPECIFIED.to_string(),
            phone_number: UNSPECIFIED.to_string(),
        }
    }
}

impl WithdrawalPayload {
    /// Tolerates an absent blob, plain JSON, or URL-encoded JSON.
    pub fn parse(blob: Option<&str>) -> Self {
        let Some(blob) = blob.map(str::trim).filter(|b| !b.is_empty()) else {
            return Self::default();
        };

        let raw = serde_json::from_str::<RawPayload>(blob).ok().or_else(|| {
            urlencoding::decode(blob)
                .ok()
                .and_then(|decoded| serde_json::from_str::<RawPayload>(&decoded).ok())
        });

        match raw {
            Some(raw) => Self {
                payment_method: non_blank(raw.payment_method).filter(|m| !m.eq_ignore_ascii_case(UNSPECIFIED)),
                account_name: non_blank(raw.account_name).unwrap_or_else(|| UNSPECIFIED.to_string()),
                phone_number: non_blank(raw.phone_number).unwrap_or_else(|| UNSPECIFIED.to_string()),
            },
            None => {
                tracing::warn!("unparseable withdrawal payload, falling back to defaults");
                Self::default()
            }
        }
    }

    pub fn payment_method_label(&self) -> &str {
        self.payment_method.as_deref().unwrap_or(UNSPECIFIED)
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({
            "payment_method": self.payment_method,
            "account_name": self.account_name,
            "phone_number": self.phone_number,
        }).to_string()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str =
        r#"{"payment_method":"orange_money","account_name":"Awa Diallo","phone_number":"+221770000000"}"#;

    #[test]
    fn test_plain_json() {
        let payload = WithdrawalPayload::parse(Some(JSON));
        assert_eq!(payload.payment_method.as_deref(), Some("orange_money"));
        assert_eq!(payload.account_name, "Awa Diallo");
        assert_eq!(payload.phone_number, "+221770000000");
    }

    #[test]
    fn test_url_encoded_json() {
        let encoded = urlencoding::encode(JSON).into_owned();
        assert_eq!(WithdrawalPayload::parse(Some(&encoded)), WithdrawalPayload::parse(Some(JSON)));
    }

    #[test]
    fn test_absent_blob_uses_placeholders() {
        let payload = WithdrawalPayload::parse(None);
        assert_eq!(payload.payment_method, None);
        assert_eq!(payload.payment_method_label(), UNSPECIFIED);
        assert_eq!(payload.account_name, UNSPECIFIED);
    }

    #[test]
    fn test_garbage_blob_uses_placeholders() {
        assert_eq!(WithdrawalPayload::parse(Some("%E0%A4%A")), WithdrawalPayload::default());
        assert_eq!(WithdrawalPayload::parse(Some("not json")), WithdrawalPayload::default());
    }

    #[test]
    fn test_missing_fields_fall_back_individually() {
        let payload = WithdrawalPayload::parse(Some(r#"{"payment_method":"  wave "}"#));
        assert_eq!(payload.payment_method.as_deref(), Some("wave"));
        assert_eq!(payload.phone_number, UNSPECIFIED);
    }

    #[test]
    fn test_placeholder_method_counts_as_absent() {
        let blob = format!(r#"{{"payment_method":"{}","phone_number":"+221770000000"}}"#, UNSPECIFIED);
        let payload = WithdrawalPayload::parse(Some(&blob));
        assert_eq!(payload.payment_method, None);
        assert_eq!(payload.phone_number, "+221770000000");
    }
}
