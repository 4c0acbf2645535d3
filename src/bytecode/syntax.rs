/*!
  Lexical pieces of assembly source: logical lines, comments, labels, operands, identifiers and
  numeric literals.
*/

use nom::{
  branch::alt,
  bytes::complete::{tag, tag_no_case, take_while1},
  character::complete::{
    alpha1,
    alphanumeric1,
    char as one_char,
    digit1,
    hex_digit1,
    oct_digit1
  },
  combinator::{all_consuming, map, opt, recognize},
  multi::many0,
  sequence::{pair, preceded},
  IResult
};
use string_cache::DefaultAtom;

/// A source line after joining `\` continuations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogicalLine {
  pub file   : DefaultAtom,
  /// Physical line number (from 1) of the first joined line.
  pub number : usize,
  pub text   : String
}

/**
  Splits `text` into logical lines. A line ending in `\` continues on the next line; a blank
  line ends a continuation. Blank lines produce nothing.
*/
pub fn logical_lines(file: &DefaultAtom, text: &str) -> Vec<LogicalLine> {
  let mut lines = Vec::new();
  let mut pending: Option<LogicalLine> = None;

  for (index, raw) in text.lines().enumerate() {
    let trimmed = raw.trim_end();
    if trimmed.trim_start().is_empty() {
      lines.extend(pending.take());
      continue;
    }

    let (body, continues) = match trimmed.strip_suffix('\\') {
      Some(body) => (body, true),
      None       => (trimmed, false)
    };
    let mut line = pending.take().unwrap_or_else(|| LogicalLine {
      file   : file.clone(),
      number : index + 1,
      text   : String::new()
    });
    line.text.push_str(body);

    match continues {
      true  => pending = Some(line),
      false => lines.push(line)
    }
  }
  lines.extend(pending);
  lines
}

/// Removes everything from the first `;` on. `\;` is a literal semicolon.
pub fn strip_comment(line: &str) -> String {
  let mut stripped = String::with_capacity(line.len());
  let mut chars = line.chars().peekable();
  while let Some(c) = chars.next() {
    match c {
      '\\' if chars.peek() == Some(&';') => {
        chars.next();
        stripped.push(';');
      }
      ';' => break,
      _   => stripped.push(c)
    }
  }
  stripped
}

/// Splits off a `label:` prefix at the first colon.
pub fn split_label(line: &str) -> (Option<&str>, &str) {
  match line.find(':') {
    Some(position) => (Some(line[..position].trim()), &line[position + 1..]),
    None           => (None, line)
  }
}

/// Splits a statement into its mnemonic and trimmed, comma-separated operands.
pub fn split_statement(statement: &str) -> (&str, Vec<&str>) {
  let statement = statement.trim();
  match statement.find(char::is_whitespace) {
    Some(position) => {
      let operands = statement[position..].split(',').map(str::trim).collect();
      (&statement[..position], operands)
    }
    None => (statement, Vec::new())
  }
}

fn identifier(input: &str) -> IResult<&str, &str> {
  recognize(
    pair(
      alt((alpha1, tag("_"))),
      many0(alt((alphanumeric1, tag("_"))))
    )
  )(input)
}

/// A letter or `_`, followed by letters, digits and `_`.
pub fn is_identifier(text: &str) -> bool {
  all_consuming(identifier)(text).is_ok()
}

fn is_binary_digit(c: char) -> bool {
  c == '0' || c == '1'
}

fn radix_literal(input: &str) -> IResult<&str, (u32, &str)> {
  alt((
    map(preceded(tag_no_case("0x"), hex_digit1), |digits| (16, digits)),
    map(preceded(tag_no_case("0b"), take_while1(is_binary_digit)), |digits| (2, digits)),
    map(preceded(tag_no_case("0c"), oct_digit1), |digits| (8, digits)),
    map(preceded(tag_no_case("0d"), digit1), |digits| (10, digits)),
    map(digit1, |digits| (10, digits)),
  ))(input)
}

/// Parses a decimal literal or a `0x`, `0b`, `0c` (octal) or `0d` prefixed one, with an
/// optional leading `-`.
pub fn parse_integer(text: &str) -> Option<i64> {
  let (_, (sign, (radix, digits))) = all_consuming(pair(opt(one_char('-')), radix_literal))(text).ok()?;
  let magnitude = i64::from_str_radix(digits, radix).ok()?;
  match sign {
    Some(_) => Some(-magnitude),
    None    => Some(magnitude)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn literals(){
    assert_eq!(parse_integer("42"), Some(42));
    assert_eq!(parse_integer("0x1F"), Some(31));
    assert_eq!(parse_integer("0XfF"), Some(255));
    assert_eq!(parse_integer("0b101"), Some(5));
    assert_eq!(parse_integer("0c17"), Some(15));
    assert_eq!(parse_integer("0d19"), Some(19));
    assert_eq!(parse_integer("-3"), Some(-3));
    assert_eq!(parse_integer("-0x10"), Some(-16));
    assert_eq!(parse_integer("0"), Some(0));
    assert_eq!(parse_integer("0b12"), None);
    assert_eq!(parse_integer("0x"), None);
    assert_eq!(parse_integer("12ab"), None);
    assert_eq!(parse_integer("forward"), None);
  }

  #[test]
  fn identifiers(){
    assert!(is_identifier("loop"));
    assert!(is_identifier("_start2"));
    assert!(!is_identifier("2start"));
    assert!(!is_identifier("a-b"));
    assert!(!is_identifier(""));
  }

  #[test]
  fn continuation_lines(){
    let file = DefaultAtom::from("test.asm");
    let text = "MOV.I %R1, \\\n  5\n\nADD.I %R1,\\\n\nSUB.I %R1, 1\n";
    let lines = logical_lines(&file, text);
    let summary: Vec<(usize, &str)> = lines.iter().map(|line| (line.number, line.text.as_str())).collect();
    assert_eq!(summary, vec![(1, "MOV.I %R1,   5"), (4, "ADD.I %R1,"), (6, "SUB.I %R1, 1")]);
  }

  #[test]
  fn comments_labels_operands(){
    assert_eq!(strip_comment("MOV.I %R1, 2 ; set"), "MOV.I %R1, 2 ");
    assert_eq!(strip_comment(".EMIT 1 \\; 2"), ".EMIT 1 ; 2");
    assert_eq!(split_label("loop: ADD.I %R1, 1"), (Some("loop"), " ADD.I %R1, 1"));
    assert_eq!(split_label("LEAVE"), (None, "LEAVE"));
    assert_eq!(split_statement("  LD.W  %R1 , 4,%R2 "), ("LD.W", vec!["%R1", "4", "%R2"]));
    assert_eq!(split_statement("LEAVE"), ("LEAVE", vec![]));
  }
}
