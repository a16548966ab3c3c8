//! System prompt assembly
//!
//! The prompt is the agent's own role and instructions, followed by a
//! summary of its tools, each extension's fragment in registration order and
//! finally the extensions' facts. It is rendered with MiniJinja so that an
//! agent can replace the layout without touching the executor.

use minijinja::Environment;
use serde::Serialize;

use crate::extension::{FactList, PromptFragment};

/// Layout used unless the agent supplies its own template
pub const DEFAULT_TEMPLATE: &str = "\
{{ role }}
{%- if instructions %}

## Instructions
{%- for item in instructions %}
- {{ item }}
{%- endfor %}
{%- endif %}
{%- if language %}

Always answer in {{ language }}.
{%- endif %}
{%- if tools %}

## Tools
{%- for tool in tools %}
- {{ tool.name }}{% if tool.description %}: {{ tool.description }}{% endif %}
{%- endfor %}
{%- endif %}
{%- for section in sections %}

## {{ section.source }}
{%- if section.fragment.objective %}
Objective: {{ section.fragment.objective }}
{%- endif %}
{%- for item in section.fragment.instructions %}
- {{ item }}
{%- endfor %}
{%- for hint in section.fragment.hints %}
Hint: {{ hint }}
{%- endfor %}
{%- endfor %}
{%- for list in facts %}

## {{ list.title }}
{%- for fact in list.facts %}
- {{ fact }}
{%- endfor %}
{%- endfor %}
";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSection {
    /// Name of the contributing extension
    pub source: String,
    pub fragment: PromptFragment,
}

/// Inputs of the system prompt for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemPrompt {
    pub role: String,
    pub instructions: Vec<String>,
    pub language: Option<String>,
    pub tools: Vec<ToolSummary>,
    pub sections: Vec<PromptSection>,
    pub facts: Vec<FactList>,
}

impl SystemPrompt {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Self::default()
        }
    }

    /// Render with the given template, or [`DEFAULT_TEMPLATE`]
    pub fn render(&self, template: Option<&str>) -> Result<String, minijinja::Error> {
        let env = Environment::new();
        let rendered = env.render_str(
            template.unwrap_or(DEFAULT_TEMPLATE),
            minijinja::Value::from_serialize(self),
        )?;
        Ok(rendered.trim().to_string())
    }
}
