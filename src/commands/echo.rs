//! `echo`: resolve a message and use it as the response

use super::{check_response, decode, normalize, Command, CommandBuilder, CommandEnv};
use crate::compare::CompareParams;
use crate::config::{deserialize_string_map, deserialize_template};
use crate::error::{ConfigResult, Result};
use crate::report::{attach, MimeType};
use serde::Deserialize;
use serde_yaml::Value as Yaml;
use std::any::Any;
use std::collections::BTreeMap;
use tracing::info;

pub const KIND: &str = "echo";

/// Normalised echo configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EchoConfig {
    pub message: String,
    pub response: Option<String>,
    pub comparison_params: CompareParams,
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ShortForm {
    #[serde(default)]
    echo_message: Option<String>,
    #[serde(default, deserialize_with = "deserialize_template")]
    echo_response: Option<String>,
    #[serde(default, rename = "comparisonParams")]
    comparison_params: CompareParams,
    #[serde(default, deserialize_with = "deserialize_string_map")]
    variables_to_set: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ExtendedForm {
    #[serde(default)]
    echo: Option<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    #[serde(default)]
    message: String,
    #[serde(default, deserialize_with = "deserialize_template")]
    response: Option<String>,
    #[serde(default, rename = "comparisonParams")]
    comparison_params: CompareParams,
    #[serde(default, deserialize_with = "deserialize_string_map")]
    variables: BTreeMap<String, String>,
}

pub struct EchoBuilder;

impl CommandBuilder for EchoBuilder {
    fn kind(&self) -> &str {
        KIND
    }

    fn build(&self, node: &Yaml) -> ConfigResult<Option<Box<dyn Command>>> {
        let short: ShortForm = decode(KIND, node)?;
        let extended: ExtendedForm = decode(KIND, node)?;

        let short = short.echo_message.map(|message| EchoConfig {
            message,
            response: short.echo_response,
            comparison_params: short.comparison_params,
            variables: short.variables_to_set,
        });
        let extended = extended.echo.map(|section| EchoConfig {
            message: section.message,
            response: section.response,
            comparison_params: section.comparison_params,
            variables: section.variables,
        });

        Ok(normalize(KIND, short, extended)?
            .map(|config| Box::new(EchoCommand::new(config)) as Box<dyn Command>))
    }
}

#[derive(Debug)]
pub struct EchoCommand {
    config: EchoConfig,
    response: Option<String>,
}

impl EchoCommand {
    pub fn new(config: EchoConfig) -> Self {
        EchoCommand {
            config,
            response: None,
        }
    }
}

impl Command for EchoCommand {
    fn kind(&self) -> &str {
        KIND
    }

    fn execute(&mut self, env: &mut CommandEnv<'_>) -> Result<()> {
        let message = env.vars.apply(&self.config.message);
        info!("echo {}", message);
        attach(env.report, "response", MimeType::sniff(&message), message.as_bytes());
        self.response = Some(message);
        Ok(())
    }

    fn response_body(&self) -> Option<&str> {
        self.response.as_deref()
    }

    fn check(&self, env: &CommandEnv<'_>) -> Result<()> {
        check_response(
            env,
            self.config.response.as_deref(),
            self.response.as_deref(),
            &self.config.comparison_params,
        )
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::Comparator;
    use crate::eval::Evaluator;
    use crate::persistent::MemoryStore;
    use crate::report::EmptyReport;
    use crate::runner::Variables;
    use std::rc::Rc;

    fn build(yaml: &str) -> Box<dyn Command> {
        let node: Yaml = serde_yaml::from_str(yaml).unwrap();
        EchoBuilder.build(&node).unwrap().unwrap()
    }

    fn run(command: &mut Box<dyn Command>, vars: &mut Variables) -> Result<()> {
        let comparator = Comparator::new(CompareParams::default(), Rc::clone(vars.evaluator()));
        let report = EmptyReport;
        let mut env = CommandEnv {
            vars,
            report: &report,
            comparator: &comparator,
        };
        command.execute(&mut env)?;
        command.check(&env)
    }

    fn vars() -> Variables {
        Variables::new(Rc::new(Evaluator::new()), Box::new(MemoryStore::new()), false)
    }

    #[test]
    fn test_forms_normalise_to_same_config() {
        let short = build("echo_message: hi\necho_response: hi");
        let extended = build("echo:\n  message: hi\n  response: hi");
        assert_eq!(
            short.config().downcast_ref::<EchoConfig>(),
            extended.config().downcast_ref::<EchoConfig>()
        );
    }

    #[test]
    fn test_message_is_resolved_and_checked() {
        let mut vv = vars();
        vv.set("who", "world").unwrap();
        let mut command = build("echo_message: hello {{$who}}\necho_response: hello world");
        run(&mut command, &mut vv).unwrap();
        assert_eq!(command.response_body(), Some("hello world"));
    }

    #[test]
    fn test_response_mismatch_is_test_error() {
        let mut vv = vars();
        let mut command = build("echo_message: one\necho_response: two");
        let err = run(&mut command, &mut vv).unwrap_err();
        let test_err = crate::error::as_test_error(&err).unwrap();
        assert_eq!(test_err.expected, "two");
        assert_eq!(test_err.actual, "one");
    }

    #[test]
    fn test_json_response_comparison() {
        let mut vv = vars();
        let yaml = r#"
echo:
  message: '{"id": 7, "tags": ["a", "b"]}'
  response:
    id: "$matchRegexp(^\\d+$)"
    tags: ["b", "a"]
  comparisonParams:
    compareJson: true
    ignoreArraysOrdering: true
"#;
        let mut command = build(yaml);
        run(&mut command, &mut vv).unwrap();
    }

    #[test]
    fn test_rerun_resolves_again() {
        let mut vv = vars();
        vv.set("n", "1").unwrap();
        let mut command = build("echo_message: \"{{$n}}\"");
        run(&mut command, &mut vv).unwrap();
        vv.set("n", "2").unwrap();
        run(&mut command, &mut vv).unwrap();
        assert_eq!(command.response_body(), Some("2"));
    }
}
