//! `{{placeholder}}` expansion for titles, commands and log paths.
//!
//! Recognized placeholders are `instance_index` and `base_name`. Whitespace
//! inside the braces is ignored. What happens with a well-formed but unknown
//! placeholder is decided by [`UnknownPlaceholders`].

use serde::Deserialize;

use crate::types::InstanceMetadata;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPlaceholders {
	/// Render unknown placeholders as nothing.
	#[default]
	Empty,
	/// Reject the template.
	Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
	/// `{{` without a matching `}}`.
	Unclosed { offset: usize },
	/// `{{}}` or `{{   }}`.
	Empty { offset: usize },
	/// Placeholder name is not an identifier.
	Malformed { offset: usize, name: String },
	/// Only produced under [`UnknownPlaceholders::Error`].
	Unknown { offset: usize, name: String },
}

impl std::fmt::Display for TemplateError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			TemplateError::Unclosed { offset } => {
				write!(f, "unclosed placeholder at offset {}", offset)
			}
			TemplateError::Empty { offset } => write!(f, "empty placeholder at offset {}", offset),
			TemplateError::Malformed { offset, name } => {
				write!(f, "malformed placeholder {:?} at offset {}", name, offset)
			}
			TemplateError::Unknown { offset, name } => {
				write!(f, "unknown placeholder {:?} at offset {}", name, offset)
			}
		}
	}
}

impl std::error::Error for TemplateError {}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateExpander {
	pub unknown: UnknownPlaceholders,
}

impl TemplateExpander {
	pub fn new(unknown: UnknownPlaceholders) -> Self {
		Self { unknown }
	}

	pub fn expand(&self, template: &str, meta: &InstanceMetadata) -> Result<String, TemplateError> {
		let mut out = String::with_capacity(template.len());
		let mut rest = template;
		let mut base = 0;

		while let Some(open) = rest.find("{{") {
			out.push_str(&rest[..open]);
			let offset = base + open;
			let after = &rest[open + 2..];
			let close = after.find("}}").ok_or(TemplateError::Unclosed { offset })?;
			let name = after[..close].trim();

			if name.is_empty() {
				return Err(TemplateError::Empty { offset });
			}
			if !is_identifier(name) {
				return Err(TemplateError::Malformed {
					offset,
					name: name.to_string(),
				});
			}

			match name {
				"instance_index" => out.push_str(&meta.instance_index.to_string()),
				"base_name" => out.push_str(&meta.base_name),
				_ => match self.unknown {
					UnknownPlaceholders::Empty => {}
					UnknownPlaceholders::Error => {
						return Err(TemplateError::Unknown {
							offset,
							name: name.to_string(),
						})
					}
				},
			}

			let consumed = open + 2 + close + 2;
			base += consumed;
			rest = &rest[consumed..];
		}

		out.push_str(rest);
		Ok(out)
	}
}

/// Expand with the permissive default policy.
pub fn expand(template: &str, meta: &InstanceMetadata) -> Result<String, TemplateError> {
	TemplateExpander::default().expand(template, meta)
}

fn is_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
