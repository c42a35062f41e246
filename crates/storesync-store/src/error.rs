use serde_json::Value;

/// A store refused or failed to apply an action.
///
/// Carries whatever detail the host chooses to send back to the client; the
/// detail may be absent.
#[derive(Debug, Clone, PartialEq, Default, thiserror::Error)]
#[error("dispatch rejected{}", describe(.detail))]
pub struct DispatchError {
    detail: Option<Value>,
}

impl DispatchError {
    /// A failure with no detail attached.
    pub fn empty() -> Self {
        Self { detail: None }
    }

    /// A failure described by a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            detail: Some(Value::String(message.into())),
        }
    }

    /// A failure described by structured data.
    pub fn with_detail(detail: Value) -> Self {
        Self {
            detail: Some(detail),
        }
    }

    /// Rebuild an error from a transmitted detail.
    pub fn from_detail(detail: Option<Value>) -> Self {
        Self { detail }
    }

    pub fn detail(&self) -> Option<&Value> {
        self.detail.as_ref()
    }

    pub fn into_detail(self) -> Option<Value> {
        self.detail
    }
}

fn describe(detail: &Option<Value>) -> String {
    match detail {
        None => String::new(),
        Some(Value::String(message)) => format!(": {message}"),
        Some(detail) => format!(": {detail}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn display_includes_detail() {
        assert_eq!(DispatchError::empty().to_string(), "dispatch rejected");
        assert_eq!(
            DispatchError::new("blam!").to_string(),
            "dispatch rejected: blam!"
        );
        assert_eq!(
            DispatchError::with_detail(json!({ "code": 7 })).to_string(),
            "dispatch rejected: {\"code\":7}"
        );
    }

    #[test]
    fn detail_survives_transmission() {
        let sent = DispatchError::with_detail(json!(["a", 1]));
        let received = DispatchError::from_detail(sent.clone().into_detail());
        assert_eq!(received, sent);
        assert_eq!(DispatchError::from_detail(None), DispatchError::empty());
    }
}
