//! `request`: send an HTTP request and check the status and JSON body

use super::{decode, Command, CommandBuilder, CommandEnv};
use crate::compare::{to_test_error, CompareParams};
use crate::config::{deserialize_string_map, deserialize_template};
use crate::error::{CommandError, ConfigError, ConfigResult, Result, TestError};
use crate::report::{attach, MimeType};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::Deserialize;
use serde_yaml::Value as Yaml;
use std::any::Any;
use std::collections::BTreeMap;
use tracing::debug;

pub const KIND: &str = "request";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RequestConfig {
    #[serde(default)]
    pub method: String,

    /// Appended to the builder's host; a full URL when no host is set
    #[serde(default)]
    pub path: String,

    /// Raw query string appended to the path, including its `?`
    #[serde(default)]
    pub query: String,

    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub headers: BTreeMap<String, String>,

    /// Request body template
    #[serde(default, rename = "request", deserialize_with = "deserialize_template")]
    pub body: Option<String>,

    /// Expected JSON body
    #[serde(default, deserialize_with = "deserialize_template")]
    pub response: Option<String>,

    #[serde(default, rename = "responseStatus")]
    pub response_status: Option<u16>,

    #[serde(default, rename = "comparisonParams")]
    pub comparison_params: CompareParams,

    #[serde(default, rename = "variables_to_set", deserialize_with = "deserialize_string_map")]
    pub variables: BTreeMap<String, String>,
}

/// Claims nodes with a `method`
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    host: String,
}

impl RequestBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        RequestBuilder { host: host.into() }
    }
}

impl CommandBuilder for RequestBuilder {
    fn kind(&self) -> &str {
        KIND
    }

    fn build(&self, node: &Yaml) -> ConfigResult<Option<Box<dyn Command>>> {
        if node.get("method").is_none() {
            return Ok(None);
        }
        let config: RequestConfig = decode(KIND, node)?;
        Ok(Some(Box::new(RequestCommand::new(&self.host, config))))
    }
}

#[derive(Debug)]
pub struct RequestCommand {
    host: String,
    config: RequestConfig,
    status: Option<u16>,
    response: Option<String>,
}

impl RequestCommand {
    pub fn new(host: &str, config: RequestConfig) -> Self {
        RequestCommand {
            host: host.to_string(),
            config,
            status: None,
            response: None,
        }
    }

    /// Status of the last response
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    fn method(&self) -> ConfigResult<Method> {
        Method::from_bytes(self.config.method.to_uppercase().as_bytes()).map_err(|_| {
            ConfigError::InvalidCommand {
                kind: KIND.to_string(),
                reason: format!("invalid method '{}'", self.config.method),
            }
        })
    }
}

/// Join host, path and query; a bare `host:port` gets `http://`
fn request_url(host: &str, path: &str, query: &str) -> String {
    let url = format!("{}{}{}", host, path, query);
    if url.starts_with("http://") || url.starts_with("https://") {
        url
    } else {
        format!("http://{}", url)
    }
}

impl Command for RequestCommand {
    fn kind(&self) -> &str {
        KIND
    }

    fn is_valid(&self) -> ConfigResult<()> {
        self.method()?;
        if self.host.is_empty() && self.config.path.trim().is_empty() {
            return Err(ConfigError::InvalidCommand {
                kind: KIND.to_string(),
                reason: "path is empty and no host is configured".to_string(),
            });
        }
        Ok(())
    }

    fn execute(&mut self, env: &mut CommandEnv<'_>) -> Result<()> {
        self.status = None;
        self.response = None;

        let method = self.method()?;
        let url = request_url(
            &env.vars.apply(&self.host),
            &env.vars.apply(&self.config.path),
            &env.vars.apply(&self.config.query),
        );
        debug!("Requesting: {} {}", method, url);

        let client = Client::builder().build().map_err(|e| CommandError::Request {
            url: url.clone(),
            error: e.to_string(),
        })?;
        let mut request = client.request(method, &url);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), env.vars.apply(value));
        }
        if !self.config.headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
            request = request.header(CONTENT_TYPE, "application/json");
        }
        if let Some(body) = &self.config.body {
            let body = env.vars.apply(body);
            attach(env.report, "request", MimeType::sniff(&body), body.as_bytes());
            request = request.body(body);
        }

        let response = request.send().map_err(|e| CommandError::Request {
            url: url.clone(),
            error: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let text = response.text().map_err(|e| CommandError::Request {
            url: url.clone(),
            error: e.to_string(),
        })?;
        debug!("Response status {} from {}", status, url);

        attach(env.report, "response", MimeType::sniff(&text), text.as_bytes());
        self.status = Some(status);
        self.response = Some(text);
        Ok(())
    }

    fn response_body(&self) -> Option<&str> {
        self.response.as_deref()
    }

    fn check(&self, env: &CommandEnv<'_>) -> Result<()> {
        if let (Some(expected), Some(actual)) = (&self.config.response, &self.response) {
            let expected = env.vars.apply(expected);
            let errors = env
                .comparator
                .compare_json_body(&expected, actual, &self.config.comparison_params)?;
            if let Some(err) = to_test_error("response body differs", &expected, actual, &errors) {
                return Err(err.into());
            }
        }

        if let Some(expected) = self.config.response_status {
            let actual = self.status.map(|s| s.to_string()).unwrap_or_default();
            if self.status != Some(expected) {
                return Err(TestError::new(
                    "response status differs",
                    expected.to_string(),
                    actual.as_str(),
                    format!("status expected {}, got {}", expected, actual),
                )
                .into());
            }
        }
        Ok(())
    }

    fn variables_to_set(&self) -> Option<&BTreeMap<String, String>> {
        if self.config.variables.is_empty() {
            None
        } else {
            Some(&self.config.variables)
        }
    }

    fn config(&self) -> &dyn Any {
        &self.config
    }

    fn config_mut(&mut self) -> &mut dyn Any {
        &mut self.config
    }
}
