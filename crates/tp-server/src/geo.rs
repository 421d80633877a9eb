//! Best-effort client geolocation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tp_core::GeoInfo;

/// Maps an IP address to a country and region. Infallible: anything that
/// goes wrong yields [`GeoInfo::unknown`].
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, ip: &str) -> GeoInfo;
}

/// Resolver that never looks anything up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGeoResolver;

#[async_trait]
impl GeoResolver for NoopGeoResolver {
    async fn resolve(&self, _ip: &str) -> GeoInfo {
        GeoInfo::unknown()
    }
}

/// Resolver backed by an ip-api.com compatible JSON endpoint
/// (`GET <endpoint>/<ip>`).
#[derive(Debug, Clone)]
pub struct IpApiResolver {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: Option<String>,
    country: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
}

impl IpApiResolver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> tp_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| tp_core::Error::Internal(format!("Failed to build geo client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn lookup(&self, ip: &str) -> Result<GeoInfo, reqwest::Error> {
        let url = format!("{}/{}", self.endpoint, urlencoding::encode(ip));
        let body: IpApiResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(into_geo(body))
    }
}

fn into_geo(body: IpApiResponse) -> GeoInfo {
    if body.status.as_deref() == Some("fail") {
        return GeoInfo::unknown();
    }
    let pick = |v: Option<String>| {
        v.filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| tp_core::UNKNOWN.to_string())
    };
    GeoInfo {
        country: pick(body.country),
        region: pick(body.region_name),
    }
}

#[async_trait]
impl GeoResolver for IpApiResolver {
    async fn resolve(&self, ip: &str) -> GeoInfo {
        match self.lookup(ip).await {
            Ok(geo) => geo,
            Err(e) => {
                tracing::debug!(ip, error = %e, "Geolocation lookup failed");
                GeoInfo::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_payload() {
        let body: IpApiResponse = serde_json::from_str(
            r#"{"status":"success","country":"Georgia","regionName":"Tbilisi","city":"Tbilisi"}"#,
        )
        .unwrap();
        let geo = into_geo(body);
        assert_eq!(geo.country, "Georgia");
        assert_eq!(geo.region, "Tbilisi");
    }

    #[test]
    fn fail_payload_is_unknown() {
        let body: IpApiResponse =
            serde_json::from_str(r#"{"status":"fail","message":"private range"}"#).unwrap();
        assert_eq!(into_geo(body), GeoInfo::unknown());
    }

    #[test]
    fn blank_region_is_unknown() {
        let body: IpApiResponse =
            serde_json::from_str(r#"{"status":"success","country":"Georgia","regionName":""}"#)
                .unwrap();
        let geo = into_geo(body);
        assert_eq!(geo.region, tp_core::UNKNOWN);
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades() {
        let resolver =
            IpApiResolver::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert_eq!(resolver.resolve("203.0.113.7").await, GeoInfo::unknown());
    }
}
