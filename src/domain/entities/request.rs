use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An action request sent to the OneBot client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub action: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub echo: String,
}

impl Request {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
            echo: String::new(),
        }
    }

    pub fn with_echo(mut self, echo: impl Into<String>) -> Self {
        self.echo = echo.into();
        self
    }

    /// Interpret a plugin payload as a request, if it has the right shape
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let request: Request = serde_json::from_value(payload.clone()).ok()?;
        if request.action.is_empty() {
            return None;
        }
        Some(request)
    }
}

/// Parameters of `send_group_msg`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMessage {
    pub group_id: i64,
    pub message: String,
}

/// Parameters of `send_private_msg`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub user_id: i64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_from_payload() {
        let payload = json!({"action": "send_group_msg", "params": {"group_id": 1, "message": "x"}});
        let request = Request::from_payload(&payload).unwrap();
        assert_eq!(request.action, "send_group_msg");
        assert_eq!(request.echo, "");
    }

    #[test]
    fn test_non_request_payloads() {
        assert!(Request::from_payload(&json!("just text")).is_none());
        assert!(Request::from_payload(&json!({"action": ""})).is_none());
        assert!(Request::from_payload(&json!({"post_type": "message"})).is_none());
    }
}
