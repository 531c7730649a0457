//! Media query evaluation for headless hosts.
//!
//! Browsers evaluate media queries natively; hosts without a window (server
//! rendering, native shells, tests) evaluate them here against a
//! [`ViewportState`]. The supported subset covers what context expressions use
//! in practice:
//!
//! - comma separated query lists (any query matching is enough)
//! - `not` / `only` prefixes and the `all`, `screen` and `print` media types
//! - `width`, `height` with `min-`/`max-` prefixes, in `px`, `em` or `rem`
//! - `orientation: portrait | landscape`
//!
//! A headless viewport is always of media type `screen`.

use std::fmt;

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
	/// Width in pixels.
	pub width: f64,
	/// Height in pixels.
	pub height: f64,
	/// Root font size in pixels, used to resolve `em` and `rem`.
	pub font_size: f64,
}

impl ViewportState {
	/// Root font size browsers use by default.
	pub const DEFAULT_FONT_SIZE: f64 = 16.0;

	/// Creates a viewport with the default root font size.
	pub fn new(width: f64, height: f64) -> Self {
		Self {
			width,
			height,
			font_size: Self::DEFAULT_FONT_SIZE,
		}
	}

	/// Creates a viewport measured in `em` at the default root font size.
	pub fn from_em(width: f64, height: f64) -> Self {
		Self::new(
			width * Self::DEFAULT_FONT_SIZE,
			height * Self::DEFAULT_FONT_SIZE,
		)
	}
}

impl Default for ViewportState {
	fn default() -> Self {
		Self::new(1024.0, 768.0)
	}
}

/// Media types a query may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
	/// Matches every device.
	All,
	/// Screens.
	Screen,
	/// Paged media.
	Print,
}

/// A CSS length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
	/// Pixels.
	Px(f64),
	/// Relative to the root font size.
	Em(f64),
	/// Relative to the root font size.
	Rem(f64),
}

impl Length {
	/// Resolves the length to pixels.
	pub fn to_px(self, font_size: f64) -> f64 {
		match self {
			Self::Px(v) => v,
			Self::Em(v) | Self::Rem(v) => v * font_size,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Range {
	Min,
	Max,
	Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
	Portrait,
	Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Feature {
	Width(Range, Length),
	Height(Range, Length),
	Orientation(Orientation),
}

impl Feature {
	fn evaluate(&self, viewport: &ViewportState) -> bool {
		match *self {
			Self::Width(range, length) => {
				compare(range, viewport.width, length.to_px(viewport.font_size))
			}
			Self::Height(range, length) => {
				compare(range, viewport.height, length.to_px(viewport.font_size))
			}
			Self::Orientation(Orientation::Portrait) => viewport.height >= viewport.width,
			Self::Orientation(Orientation::Landscape) => viewport.width > viewport.height,
		}
	}
}

fn compare(range: Range, actual: f64, bound: f64) -> bool {
	match range {
		Range::Min => actual >= bound,
		Range::Max => actual <= bound,
		Range::Exact => (actual - bound).abs() < f64::EPSILON,
	}
}

#[derive(Debug, Clone, PartialEq)]
struct MediaQuery {
	negated: bool,
	media_type: MediaType,
	features: Vec<Feature>,
}

impl MediaQuery {
	fn evaluate(&self, viewport: &ViewportState) -> bool {
		let type_matches = matches!(self.media_type, MediaType::All | MediaType::Screen);
		let result = type_matches && self.features.iter().all(|f| f.evaluate(viewport));
		result != self.negated
	}
}

/// A parsed media query list.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaQueryList {
	source: String,
	queries: Vec<MediaQuery>,
}

/// Why a media query could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaQueryError(String);

impl fmt::Display for MediaQueryError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl std::error::Error for MediaQueryError {}

impl MediaQueryList {
	/// Parses a media query list. An empty list matches everything.
	pub fn parse(source: &str) -> Result<Self, MediaQueryError> {
		let lowered = source.trim().to_ascii_lowercase();
		let queries = if lowered.is_empty() {
			Vec::new()
		} else {
			lowered
				.split(',')
				.map(parse_query)
				.collect::<Result<Vec<_>, _>>()?
		};
		Ok(Self {
			source: source.trim().to_string(),
			queries,
		})
	}

	/// Evaluates the list against `viewport`.
	pub fn evaluate(&self, viewport: &ViewportState) -> bool {
		self.queries.is_empty() || self.queries.iter().any(|q| q.evaluate(viewport))
	}

	/// Returns the source text.
	pub fn source(&self) -> &str {
		&self.source
	}
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
	Ident(&'a str),
	Group(&'a str),
}

fn tokenize(query: &str) -> Result<Vec<Token<'_>>, MediaQueryError> {
	let mut tokens = Vec::new();
	let mut rest = query.trim_start();
	while !rest.is_empty() {
		if let Some(inner) = rest.strip_prefix('(') {
			let close = inner
				.find(')')
				.ok_or_else(|| MediaQueryError(format!("unclosed '(' in '{}'", query.trim())))?;
			tokens.push(Token::Group(inner[..close].trim()));
			rest = &inner[close + 1..];
		} else {
			let end = rest
				.find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
				.unwrap_or(rest.len());
			if end == 0 {
				return Err(MediaQueryError(format!(
					"unexpected character '{}' in '{}'",
					rest.chars().next().unwrap_or(' '),
					query.trim()
				)));
			}
			tokens.push(Token::Ident(&rest[..end]));
			rest = &rest[end..];
		}
		rest = rest.trim_start();
	}
	Ok(tokens)
}

fn parse_query(query: &str) -> Result<MediaQuery, MediaQueryError> {
	let tokens = tokenize(query)?;
	let mut iter = tokens.into_iter().peekable();
	let mut negated = false;
	let mut media_type = None;

	match iter.peek() {
		Some(Token::Ident("not")) => {
			negated = true;
			iter.next();
		}
		Some(Token::Ident("only")) => {
			iter.next();
		}
		_ => {}
	}

	if let Some(Token::Ident(name)) = iter.peek() {
		if *name != "and" {
			media_type = Some(parse_media_type(name)?);
			iter.next();
		}
	}

	let mut features = Vec::new();
	let mut expect_and = media_type.is_some();
	while let Some(token) = iter.next() {
		let token = if expect_and {
			if token != Token::Ident("and") {
				return Err(MediaQueryError(format!(
					"expected 'and' in '{}'",
					query.trim()
				)));
			}
			iter.next().ok_or_else(|| {
				MediaQueryError(format!("dangling 'and' in '{}'", query.trim()))
			})?
		} else {
			token
		};
		match token {
			Token::Group(body) => features.push(parse_feature(body)?),
			Token::Ident(word) => {
				return Err(MediaQueryError(format!(
					"expected a '(feature)' but found '{}'",
					word
				)));
			}
		}
		expect_and = true;
	}

	if media_type.is_none() && features.is_empty() {
		return Err(MediaQueryError(format!(
			"empty media query '{}'",
			query.trim()
		)));
	}

	Ok(MediaQuery {
		negated,
		media_type: media_type.unwrap_or(MediaType::All),
		features,
	})
}

fn parse_media_type(name: &str) -> Result<MediaType, MediaQueryError> {
	match name {
		"all" => Ok(MediaType::All),
		"screen" => Ok(MediaType::Screen),
		"print" => Ok(MediaType::Print),
		other => Err(MediaQueryError(format!("unknown media type '{}'", other))),
	}
}

fn parse_feature(body: &str) -> Result<Feature, MediaQueryError> {
	let (name, value) = body
		.split_once(':')
		.map(|(n, v)| (n.trim(), v.trim()))
		.ok_or_else(|| MediaQueryError(format!("unsupported feature '({})'", body)))?;

	let (range, base) = if let Some(base) = name.strip_prefix("min-") {
		(Range::Min, base)
	} else if let Some(base) = name.strip_prefix("max-") {
		(Range::Max, base)
	} else {
		(Range::Exact, name)
	};

	match (base, range) {
		("width", _) => Ok(Feature::Width(range, parse_length(value)?)),
		("height", _) => Ok(Feature::Height(range, parse_length(value)?)),
		("orientation", Range::Exact) => match value {
			"portrait" => Ok(Feature::Orientation(Orientation::Portrait)),
			"landscape" => Ok(Feature::Orientation(Orientation::Landscape)),
			other => Err(MediaQueryError(format!("unknown orientation '{}'", other))),
		},
		_ => Err(MediaQueryError(format!("unsupported feature '{}'", name))),
	}
}

fn parse_length(value: &str) -> Result<Length, MediaQueryError> {
	let split = value
		.find(|c: char| !(c.is_ascii_digit() || c == '.'))
		.unwrap_or(value.len());
	let (number, unit) = value.split_at(split);
	let number: f64 = number
		.parse()
		.map_err(|_| MediaQueryError(format!("invalid length '{}'", value)))?;

	match unit.trim() {
		"px" => Ok(Length::Px(number)),
		"em" => Ok(Length::Em(number)),
		"rem" => Ok(Length::Rem(number)),
		"" if number == 0.0 => Ok(Length::Px(0.0)),
		_ => Err(MediaQueryError(format!("invalid length '{}'", value))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("(min-width:30em)", 20.0, false)]
	#[case("(min-width:30em)", 30.0, true)]
	#[case("(min-width:30em)", 40.0, true)]
	#[case("(max-width: 30em)", 40.0, false)]
	#[case("(min-width: 480px)", 30.0, true)]
	#[case("(min-width: 30rem)", 29.9, false)]
	#[case("screen and (min-width:30em) and (max-width:50em)", 40.0, true)]
	#[case("screen and (min-width:30em) and (max-width:50em)", 60.0, false)]
	#[case("print", 40.0, false)]
	#[case("not print", 40.0, true)]
	#[case("not screen and (min-width:30em)", 20.0, true)]
	#[case("only screen", 10.0, true)]
	#[case("print, (min-width:30em)", 40.0, true)]
	#[case("(max-width:10em), (min-width:50em)", 40.0, false)]
	#[case("", 1.0, true)]
	#[case("SCREEN AND (MIN-WIDTH:30EM)", 40.0, true)]
	#[case("(min-width: 0)", 0.0, true)]
	fn test_width_queries(#[case] query: &str, #[case] width_em: f64, #[case] expected: bool) {
		let list = MediaQueryList::parse(query).unwrap();
		let viewport = ViewportState::from_em(width_em, 40.0);
		assert_eq!(list.evaluate(&viewport), expected, "query: {}", query);
	}

	#[rstest]
	#[case("(orientation: portrait)", 400.0, 800.0, true)]
	#[case("(orientation: landscape)", 400.0, 800.0, false)]
	#[case("(orientation: landscape)", 800.0, 400.0, true)]
	#[case("(min-height: 500px)", 800.0, 400.0, false)]
	#[case("(height: 400px)", 800.0, 400.0, true)]
	fn test_height_and_orientation(
		#[case] query: &str,
		#[case] width: f64,
		#[case] height: f64,
		#[case] expected: bool,
	) {
		let list = MediaQueryList::parse(query).unwrap();
		assert_eq!(list.evaluate(&ViewportState::new(width, height)), expected);
	}

	#[rstest]
	fn test_font_size_scales_em() {
		let list = MediaQueryList::parse("(min-width: 30em)").unwrap();
		let mut viewport = ViewportState::new(400.0, 300.0);
		assert!(!list.evaluate(&viewport));
		viewport.font_size = 10.0;
		assert!(list.evaluate(&viewport));
	}

	#[rstest]
	#[case("(min-width:30em")]
	#[case("(color)")]
	#[case("(min-width: wide)")]
	#[case("(min-width: 30)")]
	#[case("(min-orientation: portrait)")]
	#[case("(orientation: sideways)")]
	#[case("tv")]
	#[case("screen (min-width:30em)")]
	#[case("screen and")]
	#[case("only")]
	#[case("screen and print")]
	#[case("(min-width:30em) & (max-width:50em)")]
	fn test_invalid_queries(#[case] query: &str) {
		assert!(MediaQueryList::parse(query).is_err(), "query: {}", query);
	}

	#[rstest]
	fn test_source_is_kept() {
		let list = MediaQueryList::parse("  (min-width:30em) ").unwrap();
		assert_eq!(list.source(), "(min-width:30em)");
	}
}
