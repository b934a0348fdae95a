// SPDX-License-Identifier: GPL-3.0

//! Parsing of textual type names as they appear in runtime metadata and type definition
//! documents, e.g. `Vec<AccountId>`, `(u32, Balance)`, `[u8; 32]`,
//! `<T::Lookup as StaticLookup>::Source` or `UnappliedSlash<AccountId, BalanceOf>`.

use crate::error::TypeRegistryError;
use std::fmt;

/// A parsed type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
	/// A named type with optional generic arguments.
	Named {
		/// The last path segment, e.g. `AccountId` for `T::AccountId`.
		name: String,
		/// Generic arguments in declaration order.
		args: Vec<TypeExpr>,
	},
	/// A tuple; the empty tuple is the unit type.
	Tuple(Vec<TypeExpr>),
	/// A fixed-size array.
	Array {
		/// Element type.
		element: Box<TypeExpr>,
		/// Number of elements.
		len: usize,
	},
}

impl TypeExpr {
	/// Parse a textual type name.
	pub fn parse(input: &str) -> Result<Self, TypeRegistryError> {
		let mut parser = Parser { input, position: 0 };
		let expr = parser.expr()?;
		parser.skip_whitespace();
		if parser.position != input.len() {
			return Err(parser.error("trailing characters"));
		}
		Ok(expr)
	}

	/// The base name of a named type, without generic arguments.
	pub fn base_name(&self) -> Option<&str> {
		match self {
			TypeExpr::Named { name, .. } => Some(name.as_str()),
			_ => None,
		}
	}
}

impl fmt::Display for TypeExpr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TypeExpr::Named { name, args } => {
				f.write_str(name)?;
				if !args.is_empty() {
					f.write_str("<")?;
					write_list(f, args)?;
					f.write_str(">")?;
				}
				Ok(())
			},
			TypeExpr::Tuple(items) => {
				f.write_str("(")?;
				write_list(f, items)?;
				f.write_str(")")
			},
			TypeExpr::Array { element, len } => write!(f, "[{element}; {len}]"),
		}
	}
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeExpr]) -> fmt::Result {
	for (i, item) in items.iter().enumerate() {
		if i > 0 {
			f.write_str(", ")?;
		}
		write!(f, "{item}")?;
	}
	Ok(())
}

/// Normalize a type name to its canonical spelling, e.g. `T::Balance` to `Balance` and
/// `Vec< u8 >` to `Vec<u8>`.
pub fn normalize(input: &str) -> Result<String, TypeRegistryError> {
	Ok(TypeExpr::parse(input)?.to_string())
}

struct Parser<'a> {
	input: &'a str,
	position: usize,
}

impl<'a> Parser<'a> {
	fn expr(&mut self) -> Result<TypeExpr, TypeRegistryError> {
		self.skip_whitespace();
		match self.peek() {
			Some('(') => self.tuple(),
			Some('[') => self.array(),
			Some('<') => self.projection(),
			Some('&') => {
				// References such as `&'static [u8]` decode as their target.
				self.position += 1;
				self.skip_lifetime();
				self.expr()
			},
			Some(c) if is_ident_start(c) => self.named(),
			_ => Err(self.error("expected a type")),
		}
	}

	fn tuple(&mut self) -> Result<TypeExpr, TypeRegistryError> {
		self.expect('(')?;
		let items = self.list(')')?;
		Ok(TypeExpr::Tuple(items))
	}

	fn array(&mut self) -> Result<TypeExpr, TypeRegistryError> {
		self.expect('[')?;
		let element = self.expr()?;
		self.skip_whitespace();
		if self.peek() == Some(']') {
			// A slice such as `[u8]` is a sequence.
			self.position += 1;
			return Ok(TypeExpr::Named { name: "Vec".to_string(), args: vec![element] });
		}
		self.expect(';')?;
		self.skip_whitespace();
		let digits = self.take_while(|c| c.is_ascii_digit());
		let len = digits.parse().map_err(|_| self.error("expected an array length"))?;
		self.expect(']')?;
		Ok(TypeExpr::Array { element: Box::new(element), len })
	}

	// `<T as Trait>::Name` resolves to `Name`.
	fn projection(&mut self) -> Result<TypeExpr, TypeRegistryError> {
		self.expect('<')?;
		let mut depth = 1;
		while depth > 0 {
			let c = self.peek().ok_or_else(|| self.error("unterminated projection"))?;
			match c {
				'<' => depth += 1,
				'>' => depth -= 1,
				_ => {},
			}
			self.position += c.len_utf8();
		}
		self.expect_str("::")?;
		self.named()
	}

	fn named(&mut self) -> Result<TypeExpr, TypeRegistryError> {
		let mut name = self.ident()?;
		while self.rest().starts_with("::") {
			self.position += 2;
			name = self.ident()?;
		}
		self.skip_whitespace();
		let args = if self.peek() == Some('<') {
			self.position += 1;
			self.list('>')?
		} else {
			Vec::new()
		};
		Ok(TypeExpr::Named { name, args })
	}

	fn list(&mut self, close: char) -> Result<Vec<TypeExpr>, TypeRegistryError> {
		let mut items = Vec::new();
		loop {
			self.skip_whitespace();
			if self.peek() == Some(close) {
				self.position += 1;
				return Ok(items);
			}
			if self.peek() == Some('\'') {
				// Lifetime arguments carry no type information.
				self.skip_lifetime();
			} else {
				items.push(self.expr()?);
			}
			self.skip_whitespace();
			match self.peek() {
				Some(',') => self.position += 1,
				Some(c) if c == close => {},
				_ => return Err(self.error("expected `,` or closing bracket")),
			}
		}
	}

	fn ident(&mut self) -> Result<String, TypeRegistryError> {
		self.skip_whitespace();
		match self.peek() {
			Some(c) if is_ident_start(c) => Ok(self.take_while(is_ident_char).to_string()),
			_ => Err(self.error("expected an identifier")),
		}
	}

	fn skip_lifetime(&mut self) {
		self.skip_whitespace();
		if self.peek() == Some('\'') {
			self.position += 1;
			self.take_while(is_ident_char);
		}
	}

	fn expect(&mut self, expected: char) -> Result<(), TypeRegistryError> {
		self.skip_whitespace();
		if self.peek() == Some(expected) {
			self.position += expected.len_utf8();
			Ok(())
		} else {
			Err(self.error(&format!("expected `{expected}`")))
		}
	}

	fn expect_str(&mut self, expected: &str) -> Result<(), TypeRegistryError> {
		if self.rest().starts_with(expected) {
			self.position += expected.len();
			Ok(())
		} else {
			Err(self.error(&format!("expected `{expected}`")))
		}
	}

	fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
		let input = self.input;
		let start = self.position;
		let len: usize =
			self.rest().chars().take_while(|c| predicate(*c)).map(char::len_utf8).sum();
		self.position += len;
		&input[start..self.position]
	}

	fn skip_whitespace(&mut self) {
		self.take_while(char::is_whitespace);
	}

	fn peek(&self) -> Option<char> {
		self.rest().chars().next()
	}

	fn rest(&self) -> &'a str {
		let input = self.input;
		&input[self.position..]
	}

	fn error(&self, message: &str) -> TypeRegistryError {
		TypeRegistryError::InvalidTypeName(format!(
			"{message} at offset {} in `{}`",
			self.position, self.input
		))
	}
}

fn is_ident_start(c: char) -> bool {
	c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
	use super::*;

	fn named(name: &str, args: Vec<TypeExpr>) -> TypeExpr {
		TypeExpr::Named { name: name.to_string(), args }
	}

	#[test]
	fn parses_generics() {
		assert_eq!(
			TypeExpr::parse("Vec<AccountId>").unwrap(),
			named("Vec", vec![named("AccountId", vec![])])
		);
		assert_eq!(
			TypeExpr::parse("UnappliedSlash<AccountId, BalanceOf>").unwrap(),
			named(
				"UnappliedSlash",
				vec![named("AccountId", vec![]), named("BalanceOf", vec![])]
			)
		);
	}

	#[test]
	fn parses_tuples_and_arrays() {
		assert_eq!(TypeExpr::parse("()").unwrap(), TypeExpr::Tuple(vec![]));
		assert_eq!(
			TypeExpr::parse("(u32, [u8; 32])").unwrap(),
			TypeExpr::Tuple(vec![
				named("u32", vec![]),
				TypeExpr::Array { element: Box::new(named("u8", vec![])), len: 32 },
			])
		);
		assert_eq!(TypeExpr::parse("[u8]").unwrap(), named("Vec", vec![named("u8", vec![])]));
	}

	#[test]
	fn strips_paths_and_projections() {
		assert_eq!(normalize("T::Balance").unwrap(), "Balance");
		assert_eq!(normalize("<T::Lookup as StaticLookup>::Source").unwrap(), "Source");
		assert_eq!(normalize("sp_core::crypto::AccountId32").unwrap(), "AccountId32");
		assert_eq!(normalize("&'static [u8]").unwrap(), "Vec<u8>");
	}

	#[test]
	fn normalizes_whitespace() {
		assert_eq!(normalize(" Vec< ( u32 ,Balance ) > ").unwrap(), "Vec<(u32, Balance)>");
		assert_eq!(normalize("BoundedVec<u8, S,>").unwrap(), "BoundedVec<u8, S>");
	}

	#[test]
	fn rejects_malformed_names() {
		for input in ["", "Vec<u8", "[u8; x]", "(u32", "Vec<u8>>", "1abc"] {
			assert!(
				matches!(TypeExpr::parse(input), Err(TypeRegistryError::InvalidTypeName(_))),
				"`{input}` should be rejected"
			);
		}
	}
}
