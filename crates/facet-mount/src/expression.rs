//! Context expressions.
//!
//! A context expression decides when a module should be mounted. It is a list
//! of conditions joined by `and`, each naming the monitor that evaluates it:
//!
//! ```text
//! @media (min-width:30em) and @visible true
//! ```
//!
//! A condition without an `@name` prefix uses the default monitor type
//! (`media`). Conditions are separated by `and` followed by `@`, which keeps
//! media queries such as `(min-width:30em) and (max-width:60em)` intact.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;
use crate::settings::DEFAULT_MONITOR;

/// One `@monitor query` term of a context expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
	/// Monitor type name.
	pub monitor: String,
	/// Query handed to the monitor. May be empty.
	pub query: String,
}

impl Condition {
	/// Creates a condition.
	pub fn new(monitor: impl Into<String>, query: impl Into<String>) -> Self {
		Self {
			monitor: monitor.into(),
			query: query.into(),
		}
	}
}

impl fmt::Display for Condition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.query.is_empty() {
			write!(f, "@{}", self.monitor)
		} else {
			write!(f, "@{} {}", self.monitor, self.query)
		}
	}
}

/// A parsed, immutable list of conditions that must all hold.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextExpression {
	conditions: Vec<Condition>,
}

impl ContextExpression {
	/// Parses `source`, using `media` for terms without a monitor prefix.
	pub fn parse(source: &str) -> Result<Self, ConfigurationError> {
		Self::parse_with_default(source, DEFAULT_MONITOR)
	}

	/// Parses `source`, using `default_monitor` for terms without a prefix.
	pub fn parse_with_default(
		source: &str,
		default_monitor: &str,
	) -> Result<Self, ConfigurationError> {
		let source = source.trim();
		if source.is_empty() {
			return Ok(Self::default());
		}

		let prefixed;
		let body = match source.strip_prefix('@') {
			Some(rest) => rest,
			None => {
				prefixed = format!("{} {}", default_monitor, source);
				prefixed.as_str()
			}
		};

		split_terms(body)
			.into_iter()
			.map(parse_term)
			.collect::<Result<Vec<_>, _>>()
			.map(|conditions| Self { conditions })
	}

	/// Creates an expression from already parsed conditions.
	pub fn from_conditions(conditions: Vec<Condition>) -> Self {
		Self { conditions }
	}

	/// Returns the conditions in source order.
	pub fn conditions(&self) -> &[Condition] {
		&self.conditions
	}

	/// Returns true for an expression with no conditions, which always holds.
	pub fn is_empty(&self) -> bool {
		self.conditions.is_empty()
	}

	/// Returns the number of conditions.
	pub fn len(&self) -> usize {
		self.conditions.len()
	}
}

impl FromStr for ContextExpression {
	type Err = ConfigurationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl fmt::Display for ContextExpression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, condition) in self.conditions.iter().enumerate() {
			if i > 0 {
				write!(f, " and ")?;
			}
			write!(f, "{}", condition)?;
		}
		Ok(())
	}
}

/// Splits the body (leading `@` already removed) on `and` followed by `@`.
fn split_terms(body: &str) -> Vec<&str> {
	let mut terms = Vec::new();
	let mut rest = body;
	while let Some(idx) = find_term_separator(rest) {
		terms.push(&rest[..idx.start]);
		rest = &rest[idx.end..];
	}
	terms.push(rest);
	terms
}

/// Finds the next `<ws>and<ws>@` separator and returns its byte range.
fn find_term_separator(text: &str) -> Option<std::ops::Range<usize>> {
	let bytes = text.as_bytes();
	let mut search_from = 0;
	while let Some(offset) = text[search_from..].find("and") {
		let start = search_from + offset;
		let end = start + 3;
		let preceded = start > 0 && bytes[start - 1].is_ascii_whitespace();
		let after = text[end..].trim_start();
		let followed = after.len() < text[end..].len() && after.starts_with('@');
		if preceded && followed {
			let at = text.len() - after.len();
			let ws_start = text[..start].trim_end().len();
			return Some(ws_start..at + 1);
		}
		search_from = end;
	}
	None
}

fn parse_term(term: &str) -> Result<Condition, ConfigurationError> {
	let term = term.trim();
	let name_len = term
		.char_indices()
		.find(|(i, c)| !is_name_char(*i, *c))
		.map(|(i, _)| i)
		.unwrap_or(term.len());

	if name_len == 0 {
		return Err(ConfigurationError::MalformedTerm {
			term: format!("@{}", term),
			reason: "expected a monitor name after '@'".to_string(),
		});
	}

	let (name, query) = term.split_at(name_len);
	if !query.is_empty() && !query.starts_with(char::is_whitespace) {
		return Err(ConfigurationError::MalformedTerm {
			term: format!("@{}", term),
			reason: "monitor name must be followed by whitespace".to_string(),
		});
	}
	Ok(Condition::new(name, query.trim()))
}

fn is_name_char(index: usize, c: char) -> bool {
	if index == 0 {
		c.is_ascii_lowercase()
	} else {
		c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'
	}
}
