use reqwest::{Client, StatusCode};

use crate::{error::LookupError, store::BoxFuture};

use super::{SpeedLimitReport, SpeedLimitService};

/// Speed-limit lookup over HTTP: `GET {endpoint}?lat=..&lon=..` answering
/// `{ "maxSpeed": 35, "speedUnit": "mph" }`.
pub struct HttpSpeedLimitService {
    client: Client,
    endpoint: String,
}

impl HttpSpeedLimitService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn fetch(&self, latitude: f64, longitude: f64) -> Result<Option<SpeedLimitReport>, LookupError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("lat", latitude), ("lon", longitude)])
            .send()
            .await
            .map_err(|err| LookupError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        response
            .json::<Option<SpeedLimitReport>>()
            .await
            .map_err(|err| LookupError::Transport(err.to_string()))
    }
}

impl SpeedLimitService for HttpSpeedLimitService {
    fn lookup(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> BoxFuture<'_, Result<Option<SpeedLimitReport>, LookupError>> {
        Box::pin(self.fetch(latitude, longitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn parses_report() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/speed-limit")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("lat".into(), "37.5".into()),
                Matcher::UrlEncoded("lon".into(), "-122.25".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"maxSpeed": 35, "speedUnit": "mph"}"#)
            .create_async()
            .await;

        let service = HttpSpeedLimitService::new(format!("{}/speed-limit", server.url()));
        let report = service.lookup(37.5, -122.25).await.unwrap().unwrap();

        assert_eq!(report.max_speed, Some(35.0));
        assert_eq!(report.speed_unit.as_deref(), Some("mph"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_found_is_absent_and_server_error_is_status() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/broken")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let missing = HttpSpeedLimitService::new(format!("{}/missing", server.url()));
        assert!(missing.lookup(1.0, 1.0).await.unwrap().is_none());

        let broken = HttpSpeedLimitService::new(format!("{}/broken", server.url()));
        assert!(matches!(
            broken.lookup(1.0, 1.0).await,
            Err(LookupError::Status(503))
        ));
    }

    #[tokio::test]
    async fn partial_body_leaves_fields_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/partial")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"maxSpeed": 50}"#)
            .create_async()
            .await;

        let service = HttpSpeedLimitService::new(format!("{}/partial", server.url()));
        let report = service.lookup(1.0, 1.0).await.unwrap().unwrap();
        assert_eq!(report.max_speed, Some(50.0));
        assert!(report.speed_unit.is_none());
    }
}
