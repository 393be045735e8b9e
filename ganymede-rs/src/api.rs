//! Provides a small HTTP front end for clients which are no peers.
//!
//! A request like `GET /api?key=Tom` is answered with the raw bytes of the value (as
//! **application/octet-stream**) of the group this endpoint was created for. Lookups run
//! through [Group::get](crate::group::Group::get) so they are routed to the owning peer just
//! like any other lookup of the node.
//!
//! The endpoint is served by its own [Server](crate::server::Server) which uses the **api**
//! config section (default port 9999).
use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use pct_str::PctStr;

use crate::groups::Groups;
use crate::server::Endpoint;

/// Contains the group served by default.
pub const DEFAULT_API_GROUP: &str = "scores";

/// Answers value lookups of external clients.
pub struct ApiEndpoint {
    groups: Arc<Groups>,
    group: String,
}

impl ApiEndpoint {
    /// Creates an endpoint which serves the given group.
    pub fn new(groups: Arc<Groups>, group: impl Into<String>) -> Self {
        ApiEndpoint {
            groups,
            group: group.into(),
        }
    }

    fn error(status: StatusCode, message: impl Into<String>) -> Response<Body> {
        let mut response = Response::new(Body::from(message.into()));
        *response.status_mut() = status;
        response
    }
}

/// Extracts and decodes the given parameter from a query string like "key=Tom&x=y".
fn query_parameter(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| {
            // Form encoding uses '+' for spaces, an escaped plus is "%2B"...
            let value = value.replace('+', " ");
            let decoded = PctStr::new(&value).ok().map(|value| value.decode());
            decoded
        })
}

#[async_trait]
impl Endpoint for ApiEndpoint {
    fn name(&self) -> &str {
        "api"
    }

    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        if request.uri().path() != "/api" {
            return ApiEndpoint::error(StatusCode::NOT_FOUND, "Unknown path.");
        }
        if request.method() != Method::GET {
            return ApiEndpoint::error(StatusCode::METHOD_NOT_ALLOWED, "Only GET is supported.");
        }

        let key = match request
            .uri()
            .query()
            .and_then(|query| query_parameter(query, "key"))
            .filter(|key| !key.is_empty())
        {
            Some(key) => key,
            None => return ApiEndpoint::error(StatusCode::BAD_REQUEST, "key is required"),
        };

        let group = match self.groups.get_group(&self.group) {
            Some(group) => group,
            None => {
                return ApiEndpoint::error(
                    StatusCode::NOT_FOUND,
                    format!("no such group: {}", self.group),
                )
            }
        };

        match group.get(&key).await {
            Ok(value) => {
                let mut response = Response::new(Body::from(value.byte_slice()));
                let _ = response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                response
            }
            Err(error) => ApiEndpoint::error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::{query_parameter, ApiEndpoint};
    use crate::groups::Groups;
    use crate::server::Endpoint;
    use hyper::{Body, Request, StatusCode};
    use std::sync::Arc;

    fn endpoint() -> ApiEndpoint {
        let groups = Arc::new(Groups::new());
        let _ = groups
            .new_group("scores", 0, |key: String| async move {
                match key.as_str() {
                    "Tom" => Ok(b"630".to_vec()),
                    _ => Err(anyhow::anyhow!("{} not exist", key)),
                }
            })
            .unwrap();

        ApiEndpoint::new(groups, "scores")
    }

    async fn call(endpoint: &ApiEndpoint, uri: &str) -> (StatusCode, String) {
        let response = endpoint
            .handle(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();

        (status, String::from_utf8_lossy(&body).to_string())
    }

    #[test]
    fn values_are_returned_raw() {
        crate::testing::test_async(async {
            let endpoint = endpoint();
            assert_eq!(
                call(&endpoint, "/api?key=Tom").await,
                (StatusCode::OK, "630".to_owned())
            );
            assert_eq!(
                call(&endpoint, "/api?key=kkk").await,
                (StatusCode::INTERNAL_SERVER_ERROR, "kkk not exist".to_owned())
            );
        });
    }

    #[test]
    fn invalid_requests_are_rejected() {
        crate::testing::test_async(async {
            let endpoint = endpoint();
            assert_eq!(call(&endpoint, "/api").await.0, StatusCode::BAD_REQUEST);
            assert_eq!(call(&endpoint, "/api?key=").await.0, StatusCode::BAD_REQUEST);
            assert_eq!(call(&endpoint, "/other?key=Tom").await.0, StatusCode::NOT_FOUND);

            let unknown = ApiEndpoint::new(Arc::new(Groups::new()), "scores");
            assert_eq!(call(&unknown, "/api?key=Tom").await.0, StatusCode::NOT_FOUND);
        });
    }

    #[test]
    fn query_parameters_are_decoded() {
        assert_eq!(
            query_parameter("x=1&key=a%20b", "key"),
            Some("a b".to_owned())
        );
        assert_eq!(
            query_parameter("key=Tom+Jack", "key"),
            Some("Tom Jack".to_owned())
        );
        assert_eq!(query_parameter("key=1%2B1", "key"), Some("1+1".to_owned()));
        assert_eq!(query_parameter("x=1", "key"), None);
    }
}
