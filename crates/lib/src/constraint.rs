//! Build constraints: which source files take part in a build.
//!
//! A file is excluded when its name ends in `_<os>`, `_<arch>` or
//! `_<os>_<arch>` for a known OS or architecture other than the target's, or
//! when its `//go:build` line evaluates to false. The expression language is
//! `||`, `&&`, `!` and parentheses over tags. A tag is satisfied by the target
//! OS and architecture, `unix` on unix-like targets, `gc`, any `go1.N`
//! release tag and the tags given with `--tags`.

use std::iter::Peekable;
use std::str::Chars;

use crate::platform::{Os, Platform};

/// Operating system names the toolchain knows, supported as a target or not.
const KNOWN_OS: &[&str] = &[
  "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux", "nacl", "netbsd",
  "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

/// Architecture names the toolchain knows.
const KNOWN_ARCH: &[&str] = &[
  "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle", "mips64", "mips64le",
  "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv", "riscv64", "s390", "s390x", "sparc", "sparc64",
  "wasm",
];

const BUILD_PREFIX: &str = "//go:build";

/// The target and tags source files are selected for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraints {
  target: Platform,
  tags: Vec<String>,
}

impl Constraints {
  pub fn new(target: Platform, tags: Vec<String>) -> Self {
    Self { target, tags }
  }

  /// Whether the `_<os>`/`_<arch>` suffixes of `name` (if any) match the target.
  ///
  /// The first underscore-separated element never counts, so `linux.go` is
  /// built everywhere.
  pub fn matches_file_name(&self, name: &str) -> bool {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    let Some((_, rest)) = stem.split_once('_') else {
      return true;
    };
    let parts: Vec<&str> = rest.split('_').collect();
    let n = parts.len();

    if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
      return parts[n - 2] == self.target.os.as_str() && parts[n - 1] == self.target.arch.as_str();
    }
    let last = parts[n - 1];
    if KNOWN_OS.contains(&last) {
      return last == self.target.os.as_str();
    }
    if KNOWN_ARCH.contains(&last) {
      return last == self.target.arch.as_str();
    }
    true
  }

  /// Whether the `//go:build` line of `src` (if any) is satisfied.
  pub fn matches_source(&self, src: &str) -> Result<bool, String> {
    match build_line(src) {
      Some(expr) => Ok(parse(expr)?.eval(self)),
      None => Ok(true),
    }
  }

  fn is_set(&self, tag: &str) -> bool {
    let os = self.target.os;
    tag == os.as_str()
      || tag == self.target.arch.as_str()
      || (tag == "unix" && os != Os::Windows)
      || tag == "gc"
      || tag.strip_prefix("go1.").is_some_and(|minor| minor.parse::<u32>().is_ok())
      || self.tags.iter().any(|t| t == tag)
  }
}

/// The expression of the `//go:build` line in the leading comments of `src`.
fn build_line(src: &str) -> Option<&str> {
  let mut in_block = false;
  for line in src.lines() {
    let line = line.trim();
    if in_block {
      in_block = !line.contains("*/");
      continue;
    }
    if line.is_empty() {
      continue;
    }
    if let Some(rest) = line.strip_prefix(BUILD_PREFIX)
      && (rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
      return Some(rest.trim());
    }
    if line.starts_with("//") {
      continue;
    }
    if let Some(rest) = line.strip_prefix("/*") {
      in_block = !rest.contains("*/");
      continue;
    }
    // Constraints only appear before the package clause.
    return None;
  }
  None
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
  Tag(String),
  Not(Box<Expr>),
  All(Vec<Expr>),
  Any(Vec<Expr>),
}

impl Expr {
  fn eval(&self, constraints: &Constraints) -> bool {
    match self {
      Self::Tag(tag) => constraints.is_set(tag),
      Self::Not(inner) => !inner.eval(constraints),
      Self::All(exprs) => exprs.iter().all(|e| e.eval(constraints)),
      Self::Any(exprs) => exprs.iter().any(|e| e.eval(constraints)),
    }
  }
}

fn parse(src: &str) -> Result<Expr, String> {
  let mut parser = Parser {
    chars: src.chars().peekable(),
  };
  let expr = parser.or()?;
  parser.skip_space();
  match parser.chars.next() {
    None => Ok(expr),
    Some(c) => Err(format!("unexpected '{c}' in build constraint")),
  }
}

/// Recursive descent over `a || b`, `a && b`, `!a`, `(a)`.
struct Parser<'a> {
  chars: Peekable<Chars<'a>>,
}

impl Parser<'_> {
  fn skip_space(&mut self) {
    while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
  }

  /// Consume the two-character operator `op` if it comes next.
  fn operator(&mut self, op: char) -> Result<bool, String> {
    self.skip_space();
    if self.chars.next_if_eq(&op).is_none() {
      return Ok(false);
    }
    match self.chars.next() {
      Some(c) if c == op => Ok(true),
      _ => Err(format!("expected '{op}{op}' in build constraint")),
    }
  }

  fn or(&mut self) -> Result<Expr, String> {
    let mut exprs = vec![self.and()?];
    while self.operator('|')? {
      exprs.push(self.and()?);
    }
    Ok(if exprs.len() == 1 { exprs.remove(0) } else { Expr::Any(exprs) })
  }

  fn and(&mut self) -> Result<Expr, String> {
    let mut exprs = vec![self.not()?];
    while self.operator('&')? {
      exprs.push(self.not()?);
    }
    Ok(if exprs.len() == 1 { exprs.remove(0) } else { Expr::All(exprs) })
  }

  fn not(&mut self) -> Result<Expr, String> {
    self.skip_space();
    if self.chars.next_if_eq(&'!').is_some() {
      return Ok(Expr::Not(Box::new(self.not()?)));
    }
    self.atom()
  }

  fn atom(&mut self) -> Result<Expr, String> {
    self.skip_space();
    if self.chars.next_if_eq(&'(').is_some() {
      let expr = self.or()?;
      self.skip_space();
      return match self.chars.next() {
        Some(')') => Ok(expr),
        _ => Err("missing ')' in build constraint".to_string()),
      };
    }

    let mut tag = String::new();
    while let Some(c) = self.chars.next_if(|c| c.is_alphanumeric() || *c == '_' || *c == '.') {
      tag.push(c);
    }
    if tag.is_empty() {
      return Err("expected build tag".to_string());
    }
    Ok(Expr::Tag(tag))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::Arch;

  fn linux(tags: &[&str]) -> Constraints {
    Constraints::new(
      Platform::new(Os::Linux, Arch::Amd64),
      tags.iter().map(|t| t.to_string()).collect(),
    )
  }

  fn windows() -> Constraints {
    Constraints::new(Platform::new(Os::Windows, Arch::Arm64), Vec::new())
  }

  mod file_names {
    use super::*;

    #[test]
    fn os_and_arch_suffixes() {
      let c = linux(&[]);
      assert!(c.matches_file_name("poll.go"));
      assert!(c.matches_file_name("poll_linux.go"));
      assert!(c.matches_file_name("poll_amd64.go"));
      assert!(c.matches_file_name("poll_linux_amd64.go"));
      assert!(!c.matches_file_name("poll_windows.go"));
      assert!(!c.matches_file_name("poll_plan9.go"));
      assert!(!c.matches_file_name("poll_arm64.go"));
      assert!(!c.matches_file_name("poll_linux_arm64.go"));

      let w = windows();
      assert!(w.matches_file_name("poll_windows_arm64.go"));
      assert!(!w.matches_file_name("poll_linux.go"));
    }

    #[test]
    fn first_element_is_not_a_constraint() {
      assert!(windows().matches_file_name("linux.go"));
      assert!(windows().matches_file_name("amd64.go"));
    }

    #[test]
    fn unknown_suffixes_are_ignored() {
      assert!(linux(&[]).matches_file_name("string_helpers.go"));
      assert!(linux(&[]).matches_file_name("x_unix.go"));
    }
  }

  mod build_lines {
    use super::*;

    #[test]
    fn found_before_package_clause_only() {
      assert_eq!(
        build_line("// Copyright\n\n//go:build linux && !race\n\npackage p\n"),
        Some("linux && !race")
      );
      assert_eq!(build_line("/* licence\n header */\n//go:build ignore\npackage p\n"), Some("ignore"));
      assert_eq!(build_line("package p\n\n//go:build linux\n"), None);
      assert_eq!(build_line("//go:buildlinux\npackage p\n"), None);
    }

    #[test]
    fn expressions() {
      let c = linux(&["netgo"]);
      let eval = |src: &str| parse(src).unwrap().eval(&c);

      assert!(eval("linux"));
      assert!(eval("unix && amd64"));
      assert!(eval("windows || netgo"));
      assert!(eval("!(windows || darwin) && go1.21"));
      assert!(eval("gc"));
      assert!(!eval("ignore"));
      assert!(!eval("cgo"));
      assert!(!eval("linux && !netgo"));
      assert!(!windows().matches_source("//go:build unix\n\npackage p\n").unwrap());
    }

    #[test]
    fn malformed_expressions_are_errors() {
      assert!(parse("linux &").is_err());
      assert!(parse("(linux").is_err());
      assert!(parse("linux darwin").is_err());
      assert!(parse("").is_err());
    }

    #[test]
    fn sources_without_a_constraint_match() {
      assert!(windows().matches_source("package p\n").unwrap());
    }
  }
}
