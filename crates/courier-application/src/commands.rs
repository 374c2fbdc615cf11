//! Slash commands.
//!
//! A prompt whose first text block starts with `/name` is expanded into the
//! configured template before it reaches the execution engine:
//!
//! ```text
//! /review target=release "extra words" be strict
//!   │      └─ key=value args fill {target}
//!   └─ command name          free words become additional instructions
//! ```

use courier_core::config::CommandConfig;
use courier_core::protocol::update::{AvailableCommand, AvailableCommandInput};
use courier_core::protocol::ContentBlock;
use courier_core::{CourierError, Result};
use std::collections::BTreeMap;

const ADDITIONAL_INSTRUCTIONS_HEADER: &str = "\n\n---\n\nAdditional instructions:\n";

/// A slash command found in a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashInvocation {
    pub name: String,
    /// Everything after the first space, untrimmed.
    pub args: String,
}

/// Configured slash commands, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    commands: BTreeMap<String, CommandConfig>,
}

impl CommandCatalog {
    pub fn new(commands: impl IntoIterator<Item = CommandConfig>) -> Self {
        let mut map = BTreeMap::new();
        for command in commands {
            let name = command.name.trim_start_matches('/').to_string();
            if name.is_empty() {
                tracing::warn!("Skipping slash command with empty name");
                continue;
            }
            if map.insert(name.clone(), command).is_some() {
                tracing::warn!("Duplicate slash command /{}, keeping the last definition", name);
            }
        }
        Self { commands: map }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Commands as advertised in an `available_commands` update.
    pub fn available_commands(&self) -> Vec<AvailableCommand> {
        self.commands
            .iter()
            .map(|(name, command)| AvailableCommand {
                name: name.clone(),
                description: if command.description.is_empty() {
                    format!("Run the {name} command")
                } else {
                    command.description.clone()
                },
                input: Some(AvailableCommandInput {
                    hint: command_hint(&command.defaults),
                }),
            })
            .collect()
    }

    /// Expands a slash command prompt.
    ///
    /// Prompts without a slash command, or any prompt when no commands are
    /// configured, are returned unchanged. An expanded prompt is the rendered
    /// template followed by the original non-text blocks.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::InvalidParams` naming the available commands
    /// when the command is unknown.
    pub fn expand(&self, prompt: Vec<ContentBlock>) -> Result<Vec<ContentBlock>> {
        if self.commands.is_empty() {
            return Ok(prompt);
        }
        let Some(invocation) = parse_slash_command(&prompt) else {
            return Ok(prompt);
        };
        let Some(command) = self.commands.get(&invocation.name) else {
            return Err(CourierError::invalid_params(format!(
                "unknown command '/{}'. Available commands: {}",
                invocation.name,
                self.command_names()
            )));
        };

        let (args, additional) = parse_command_args(&invocation.args);
        let mut values = command.defaults.clone();
        values.extend(args);

        let mut text = render_template(&command.content, &values);
        if !additional.is_empty() {
            text.push_str(ADDITIONAL_INSTRUCTIONS_HEADER);
            text.push_str(&additional);
        }
        tracing::debug!("Expanded slash command /{}", invocation.name);

        let mut expanded = vec![ContentBlock::text(text)];
        expanded.extend(prompt.into_iter().filter(|block| block.as_text().is_none()));
        Ok(expanded)
    }

    fn command_names(&self) -> String {
        self.commands
            .keys()
            .map(|name| format!("/{name}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Finds the first text block that starts with `/name`.
///
/// The name runs to the first space and may itself contain slashes
/// (`/git/pr`). A bare `/` is skipped.
pub fn parse_slash_command(prompt: &[ContentBlock]) -> Option<SlashInvocation> {
    prompt.iter().filter_map(ContentBlock::as_text).find_map(|text| {
        let rest = text.trim().strip_prefix('/')?;
        let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
        if name.is_empty() {
            return None;
        }
        Some(SlashInvocation {
            name: name.to_string(),
            args: args.to_string(),
        })
    })
}

/// Splits command arguments into `key=value` pairs and free text.
///
/// Values may be double-quoted to include spaces. Words that are not
/// `key=value` are joined with single spaces into the free text.
///
/// ```text
/// target=main fix the bug         -> {target: main}, "fix the bug"
/// title="my feature" draft=true   -> {title: my feature, draft: true}, ""
/// ```
pub fn parse_command_args(args: &str) -> (BTreeMap<String, String>, String) {
    let mut pairs = BTreeMap::new();
    let mut words = Vec::new();
    let bytes = args.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let start = i;
        while i < bytes.len() && bytes[i] != b'=' && bytes[i] != b' ' {
            i += 1;
        }

        if i < bytes.len() && bytes[i] == b'=' {
            let key = &args[start..i];
            i += 1;
            let value = if i < bytes.len() && bytes[i] == b'"' {
                let value_start = i + 1;
                let mut end = value_start;
                while end < bytes.len() && bytes[end] != b'"' {
                    end += 1;
                }
                i = (end + 1).min(bytes.len());
                &args[value_start..end]
            } else {
                let value_start = i;
                while i < bytes.len() && bytes[i] != b' ' {
                    i += 1;
                }
                &args[value_start..i]
            };
            pairs.insert(key.to_string(), value.to_string());
        } else {
            words.push(&args[start..i]);
        }
    }

    (pairs, words.join(" "))
}

/// Replaces every `{key}` in `template` with its value.
fn render_template(template: &str, values: &BTreeMap<String, String>) -> String {
    values.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{key}}}"), value)
    })
}

fn command_hint(defaults: &BTreeMap<String, String>) -> String {
    if defaults.is_empty() {
        return "additional instructions (optional)".to_string();
    }
    let parts: Vec<String> = defaults.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("[{}] additional instructions", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review() -> CommandConfig {
        CommandConfig {
            name: "review".to_string(),
            description: "Review the diff".to_string(),
            content: "Review changes against {target} in {mode} mode.".to_string(),
            defaults: BTreeMap::from([
                ("target".to_string(), "main".to_string()),
                ("mode".to_string(), "strict".to_string()),
            ]),
        }
    }

    fn plain(name: &str) -> CommandConfig {
        CommandConfig {
            name: name.to_string(),
            description: String::new(),
            content: format!("Do {name}."),
            defaults: BTreeMap::new(),
        }
    }

    fn image() -> ContentBlock {
        ContentBlock::Image {
            data: "AAA".to_string(),
            mime_type: "image/png".to_string(),
        }
    }

    #[test]
    fn test_parse_slash_command_finds_first_text_block() {
        let prompt = vec![image(), ContentBlock::text("  /git/pr draft=true please")];
        let invocation = parse_slash_command(&prompt).unwrap();
        assert_eq!(invocation.name, "git/pr");
        assert_eq!(invocation.args, "draft=true please");

        assert!(parse_slash_command(&[ContentBlock::text("/ nothing")]).is_none());
        assert!(parse_slash_command(&[ContentBlock::text("no command")]).is_none());
    }

    #[test]
    fn test_parse_command_args() {
        let (pairs, text) = parse_command_args("target=main fix the bug");
        assert_eq!(pairs, BTreeMap::from([("target".to_string(), "main".to_string())]));
        assert_eq!(text, "fix the bug");

        let (pairs, text) = parse_command_args(r#"title="my feature" draft=true"#);
        assert_eq!(pairs["title"], "my feature");
        assert_eq!(pairs["draft"], "true");
        assert_eq!(text, "");

        let (pairs, _) = parse_command_args(r#"title="unterminated"#);
        assert_eq!(pairs["title"], "unterminated");

        let (pairs, text) = parse_command_args("empty=  word");
        assert_eq!(pairs["empty"], "");
        assert_eq!(text, "word");
    }

    #[test]
    fn test_expand_substitutes_args_over_defaults() {
        let catalog = CommandCatalog::new([review()]);
        let prompt = vec![ContentBlock::text("/review target=release look at tests"), image()];

        let expanded = catalog.expand(prompt).unwrap();

        assert_eq!(expanded.len(), 2);
        assert_eq!(
            expanded[0].as_text().unwrap(),
            "Review changes against release in strict mode.\n\n---\n\nAdditional instructions:\nlook at tests"
        );
        assert_eq!(expanded[1], image());
    }

    #[test]
    fn test_expand_passes_through_without_command() {
        let catalog = CommandCatalog::new([review()]);
        let prompt = vec![ContentBlock::text("just a question")];
        assert_eq!(catalog.expand(prompt.clone()).unwrap(), prompt);

        let empty = CommandCatalog::default();
        let slash = vec![ContentBlock::text("/review")];
        assert_eq!(empty.expand(slash.clone()).unwrap(), slash);
    }

    #[test]
    fn test_unknown_command_lists_available() {
        let catalog = CommandCatalog::new([review(), plain("explain")]);

        let err = catalog.expand(vec![ContentBlock::text("/deploy now")]).unwrap_err();

        assert_eq!(
            err,
            CourierError::invalid_params("unknown command '/deploy'. Available commands: /explain, /review")
        );
    }

    #[test]
    fn test_available_commands_hints() {
        let catalog = CommandCatalog::new([review(), plain("explain")]);

        let commands = catalog.available_commands();

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].name, "explain");
        assert_eq!(commands[0].description, "Run the explain command");
        assert_eq!(
            commands[0].input.as_ref().unwrap().hint,
            "additional instructions (optional)"
        );
        assert_eq!(
            commands[1].input.as_ref().unwrap().hint,
            "[mode=strict target=main] additional instructions"
        );
    }
}
