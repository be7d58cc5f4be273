use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }

    /// `GET` sends its fields in the query string; everything else as a JSON body.
    pub fn default_encoding(&self) -> Encoding {
        match self {
            Method::Get => Encoding::Query,
            Method::Post | Method::Put => Encoding::Json,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the template's fields end up on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Query,
    Json,
}

/// The abstract field set every geospatial endpoint draws from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fields {
    /// Query text pool, cycled by iteration index.
    pub queries: Vec<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub top_k: Option<u32>,
}

impl Fields {
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.lat.is_none() && self.lon.is_none() && self.top_k.is_none()
    }
}

/// Description of the request a scenario issues on every iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    method: Method,
    path: String,
    encoding: Encoding,
    headers: Vec<(String, String)>,
    fields: Fields,
}

impl RequestTemplate {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            encoding: method.default_encoding(),
            headers: vec![],
            fields: Fields::default(),
        }
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn query(self, query: &str) -> Self {
        self.queries(vec![query.to_string()])
    }

    pub fn queries(mut self, queries: Vec<String>) -> Self {
        self.fields.queries = queries;
        self
    }

    pub fn lat_lon(mut self, lat: f64, lon: f64) -> Self {
        self.fields.lat = Some(lat);
        self.fields.lon = Some(lon);
        self
    }

    pub fn top_k(mut self, top_k: u32) -> Self {
        self.fields.top_k = Some(top_k);
        self
    }

    pub(crate) fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn wire_encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Query text used by the given iteration, if the template has a query pool.
    pub fn query_for(&self, iteration: u64) -> Option<&str> {
        let pool = &self.fields.queries;
        if pool.is_empty() {
            None
        } else {
            Some(&pool[(iteration % pool.len() as u64) as usize])
        }
    }

    pub(crate) fn validate(&self, scenario: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTemplate {
            scenario: scenario.to_string(),
            reason,
        };

        if !self.path.starts_with('/') {
            return Err(invalid(format!("path `{}` must start with `/`", self.path)));
        }

        if self.path.contains('?') {
            return Err(invalid(format!(
                "path `{}` must not carry a query string; use fields instead",
                self.path
            )));
        }

        if self.fields.queries.iter().any(|q| q.is_empty()) {
            return Err(invalid("query pool contains an empty string".to_string()));
        }

        for (name, value) in [("lat", self.fields.lat), ("lon", self.fields.lon)] {
            if matches!(value, Some(v) if !v.is_finite()) {
                return Err(invalid(format!("`{name}` must be a finite number")));
            }
        }

        for (name, value) in &self.headers {
            if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(invalid(format!("`{name}` is not a valid header name")));
            }
            if http::HeaderValue::from_str(value).is_err() {
                return Err(invalid(format!("header `{name}` has an invalid value {value:?}")));
            }
        }

        Ok(())
    }
}
