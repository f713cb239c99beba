use std::collections::BTreeMap;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::domain::User;

/// Default filter shape: a flat map of filter names to JSON values.
pub type Filters = BTreeMap<String, Value>;

/// Request for one page of a list. Filters are flattened next to `page` and `limit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListQuery<F = Filters> {
    pub page: u32,
    pub limit: u32,
    #[serde(flatten)]
    pub filters: F,
}

impl<F: Serialize> ListQuery<F> {
    /// Flattens the query into string pairs for a URL query string.
    ///
    /// Null filter values are skipped, strings are passed through verbatim, and any other
    /// value is rendered as compact JSON.
    pub fn query_pairs(&self) -> serde_json::Result<Vec<(String, String)>> {
        let Value::Object(fields) = serde_json::to_value(self)? else {
            return Err(de::Error::custom("list query must serialize to an object"));
        };

        Ok(fields
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(text) => Some((key, text)),
                other => Some((key, other.to_string())),
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub total_pages: u32,
    pub total: u64,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> ListResult<T> {
    /// `page <= max(total_pages, 1)` and no more items than the page size.
    pub fn is_consistent(&self) -> bool {
        let pagination = &self.pagination;
        pagination.page <= pagination.total_pages.max(1)
            && self.items.len() <= pagination.limit as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
}

/// Envelope used by the auth endpoints, discriminated on the boolean `success` field.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<D> {
    Success {
        data: D,
        message: Option<String>,
    },
    Failure {
        message: Option<String>,
        error: Option<String>,
    },
}

pub type LoginResponse = ApiResponse<AuthPayload>;
pub type MeResponse = ApiResponse<User>;

impl<D> ApiResponse<D> {
    pub fn success(data: D) -> Self {
        ApiResponse::Success {
            data,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ApiResponse::Failure {
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ApiResponse::Success { message, .. } | ApiResponse::Failure { message, .. } => {
                message.as_deref()
            }
        }
    }

    pub fn into_data(self) -> Option<D> {
        match self {
            ApiResponse::Success { data, .. } => Some(data),
            ApiResponse::Failure { .. } => None,
        }
    }
}

#[derive(Serialize)]
struct ApiResponseRef<'a, D> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a D>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Deserialize)]
struct RawApiResponse<D> {
    success: bool,
    data: Option<D>,
    message: Option<String>,
    error: Option<String>,
}

impl<D: Serialize> Serialize for ApiResponse<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = match self {
            ApiResponse::Success { data, message } => ApiResponseRef {
                success: true,
                data: Some(data),
                message: message.as_deref(),
                error: None,
            },
            ApiResponse::Failure { message, error } => ApiResponseRef {
                success: false,
                data: None,
                message: message.as_deref(),
                error: error.as_deref(),
            },
        };
        raw.serialize(serializer)
    }
}

impl<'de, D: Deserialize<'de>> Deserialize<'de> for ApiResponse<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        let raw = RawApiResponse::<D>::deserialize(deserializer)?;
        if !raw.success {
            return Ok(ApiResponse::Failure {
                message: raw.message,
                error: raw.error,
            });
        }
        let data = raw
            .data
            .ok_or_else(|| <De::Error as de::Error>::missing_field("data"))?;
        Ok(ApiResponse::Success {
            data,
            message: raw.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::{Role, UserId};

    fn sample_user() -> User {
        User {
            id: UserId(3),
            name: "Vera".into(),
            email: "vera@example.com".into(),
            is_active: true,
            role: Role::Admin,
        }
    }

    #[test]
    fn list_query_flattens_filters_next_to_paging() {
        let mut filters = Filters::new();
        filters.insert("search".into(), json!("eagles"));
        filters.insert("category".into(), json!(2));
        filters.insert("archived".into(), Value::Null);
        let query = ListQuery {
            page: 3,
            limit: 25,
            filters,
        };

        let json = serde_json::to_value(&query).expect("serialize");
        assert_eq!(json["page"], json!(3));
        assert_eq!(json["search"], json!("eagles"));

        let pairs = query.query_pairs().expect("pairs");
        assert!(pairs.contains(&("page".to_string(), "3".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "25".to_string())));
        assert!(pairs.contains(&("search".to_string(), "eagles".to_string())));
        assert!(pairs.contains(&("category".to_string(), "2".to_string())));
        assert!(!pairs.iter().any(|(key, _)| key == "archived"));
    }

    #[test]
    fn pagination_uses_camel_case_total_pages() {
        let raw = json!({
            "items": [1, 2],
            "pagination": {"page": 1, "totalPages": 4, "total": 8, "limit": 2}
        });
        let result: ListResult<i32> = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(result.pagination.total_pages, 4);
        assert!(result.is_consistent());
    }

    #[test]
    fn detects_inconsistent_pages() {
        let result = ListResult {
            items: vec![1, 2, 3],
            pagination: Pagination {
                page: 1,
                total_pages: 1,
                total: 3,
                limit: 2,
            },
        };
        assert!(!result.is_consistent());

        let empty = ListResult::<i32> {
            items: Vec::new(),
            pagination: Pagination {
                page: 1,
                total_pages: 0,
                total: 0,
                limit: 10,
            },
        };
        assert!(empty.is_consistent());
    }

    #[test]
    fn login_response_success_variant_parses() {
        let raw = json!({
            "success": true,
            "data": {"user": serde_json::to_value(sample_user()).unwrap(), "token": "abc"},
            "message": "welcome"
        });
        let response: LoginResponse = serde_json::from_value(raw).expect("deserialize");
        match response {
            ApiResponse::Success { data, message } => {
                assert_eq!(data.token, "abc");
                assert_eq!(data.user, sample_user());
                assert_eq!(message.as_deref(), Some("welcome"));
            }
            ApiResponse::Failure { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn login_response_failure_variant_keeps_server_message() {
        let raw = json!({"success": false, "message": "Credenciales inválidas", "error": "AUTH"});
        let response: LoginResponse = serde_json::from_value(raw).expect("deserialize");
        assert!(!response.is_success());
        assert_eq!(response.message(), Some("Credenciales inválidas"));
        assert_eq!(
            response,
            ApiResponse::Failure {
                message: Some("Credenciales inválidas".into()),
                error: Some("AUTH".into()),
            }
        );
    }

    #[test]
    fn success_without_data_is_rejected() {
        let raw = json!({"success": true});
        assert!(serde_json::from_value::<MeResponse>(raw).is_err());
    }

    #[test]
    fn serializes_with_boolean_discriminator() {
        let response: MeResponse = ApiResponse::success(sample_user());
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["success"], json!(true));
        assert_eq!(json["data"]["email"], json!("vera@example.com"));
        assert!(json.get("error").is_none());

        let failure: MeResponse = ApiResponse::failure("expired");
        let json = serde_json::to_value(&failure).expect("serialize");
        assert_eq!(json, json!({"success": false, "message": "expired"}));
    }
}
