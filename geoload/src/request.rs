//! Turns a scenario's request template into a concrete request per iteration.
use geoload_core::{
    Encoding, Method, RequestTemplate, ScenarioConfig, CONTENT_TYPE_JSON,
};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

/// A fully-resolved request, owned by the virtual user issuing it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInstance {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RequestInstance {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn into_reqwest(
        self,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> reqwest::RequestBuilder {
        let method = match self.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = client.request(method, self.url).timeout(timeout);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = self.body {
            builder = builder.body(body);
        }
        builder
    }
}

/// Builds [`RequestInstance`]s from a template. Pure: no I/O, no blocking.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: Url,
    template: RequestTemplate,
}

impl RequestBuilder {
    pub fn new(base_url: &Url, template: &RequestTemplate) -> Self {
        Self {
            base_url: base_url.clone(),
            template: template.clone(),
        }
    }

    pub fn for_scenario(config: &ScenarioConfig) -> Self {
        Self::new(config.base_url(), config.request())
    }

    pub fn build(&self, iteration: u64) -> RequestInstance {
        let template = &self.template;

        let mut url = self.base_url.clone();
        let path = format!(
            "{}{}",
            self.base_url.path().trim_end_matches('/'),
            template.path()
        );
        url.set_path(&path);
        url.set_query(None);

        let body = match template.wire_encoding() {
            Encoding::Query => {
                let pairs = self.field_pairs(iteration);
                if !pairs.is_empty() {
                    let mut query = url.query_pairs_mut();
                    for (name, value) in &pairs {
                        query.append_pair(name, value);
                    }
                }
                None
            }
            Encoding::Json => self.json_body(iteration),
        };

        RequestInstance {
            method: template.method(),
            url,
            headers: self.headers(),
            body,
        }
    }

    fn field_pairs(&self, iteration: u64) -> Vec<(&'static str, String)> {
        let fields = self.template.fields();
        let mut pairs = vec![];
        if let Some(query) = self.template.query_for(iteration) {
            pairs.push(("query", query.to_string()));
        }
        if let Some(top_k) = fields.top_k {
            pairs.push(("top_k", top_k.to_string()));
        }
        if let Some(lat) = fields.lat {
            pairs.push(("lat", lat.to_string()));
        }
        if let Some(lon) = fields.lon {
            pairs.push(("lon", lon.to_string()));
        }
        pairs
    }

    fn json_body(&self, iteration: u64) -> Option<Vec<u8>> {
        let fields = self.template.fields();
        if fields.is_empty() {
            return None;
        }

        let mut body = Map::new();
        if let Some(query) = self.template.query_for(iteration) {
            body.insert("query".into(), Value::from(query));
        }
        if let Some(top_k) = fields.top_k {
            body.insert("top_k".into(), Value::from(top_k));
        }
        if let Some(lat) = fields.lat {
            body.insert("lat".into(), Value::from(lat));
        }
        if let Some(lon) = fields.lon {
            body.insert("lon".into(), Value::from(lon));
        }
        Some(Value::Object(body).to_string().into_bytes())
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string()),
            ("Accept".to_string(), CONTENT_TYPE_JSON.to_string()),
        ];
        for (name, value) in self.template.headers() {
            headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }
        headers
    }
}
