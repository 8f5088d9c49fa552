//! Loading package descriptors from source directories.
//!
//! This module handles:
//! - Reading a directory's source files and extracting the package clause and
//!   import declarations ([`load_dir`])
//! - Walking a project tree to find every package in it ([`discover`])
//!
//! Only the file header is read: parsing stops at the first declaration that
//! is not an import. Files excluded by the target's [`Constraints`] are not
//! part of the package.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::constraint::Constraints;
use crate::consts::SOURCE_EXT;
use crate::package::{PackageFlags, RawPackage};

const TEST_SUFFIX: &str = "_test.go";

/// Directory names never searched for packages.
const SKIPPED_DIRS: &[&str] = &["vendor", "testdata"];

/// Errors that can occur while loading packages.
#[derive(Debug, Error)]
pub enum LoadError {
  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk {}: {message}", root.display())]
  Walk { root: PathBuf, message: String },

  #[error("no source files in {}", dir.display())]
  NoSources { dir: PathBuf },

  #[error("{}: {message}", path.display())]
  Parse { path: PathBuf, message: String },

  #[error("found packages {first} and {second} in {}", dir.display())]
  MixedPackages {
    dir: PathBuf,
    first: String,
    second: String,
  },
}

/// Load the package in `dir`.
///
/// The returned descriptor has an empty import path; the caller stamps it.
pub fn load_dir(dir: &Path, constraints: &Constraints) -> Result<RawPackage, LoadError> {
  let mut files = Vec::new();
  let mut package_name: Option<String> = None;
  let mut imports: Vec<String> = Vec::new();

  for file in source_files(dir, constraints)? {
    let path = dir.join(&file);
    let content = fs::read_to_string(&path).map_err(|source| LoadError::Read {
      path: path.clone(),
      source,
    })?;
    let selected = constraints.matches_source(&content).map_err(|message| LoadError::Parse {
      path: path.clone(),
      message,
    })?;
    if !selected {
      trace!(file = %path.display(), "excluded by build constraint");
      continue;
    }

    let header = parse_header(&content).map_err(|message| LoadError::Parse {
      path: path.clone(),
      message,
    })?;
    trace!(file = %path.display(), package = %header.package, imports = header.imports.len(), "parsed header");

    match &package_name {
      None => package_name = Some(header.package),
      Some(first) if *first != header.package => {
        return Err(LoadError::MixedPackages {
          dir: dir.to_path_buf(),
          first: first.clone(),
          second: header.package,
        });
      }
      Some(_) => {}
    }

    for import in header.imports {
      if !imports.contains(&import) {
        imports.push(import);
      }
    }
    files.push(file);
  }

  if files.is_empty() {
    return Err(LoadError::NoSources { dir: dir.to_path_buf() });
  }

  Ok(RawPackage {
    import_path: String::new(),
    dir: dir.to_path_buf(),
    files,
    imports,
    flags: PackageFlags {
      main: package_name.as_deref() == Some("main"),
      ..Default::default()
    },
  })
}

/// Find every package under `root`, assigning import paths below `prefix`.
///
/// Hidden directories (leading `.` or `_`), `vendor` and `testdata` are not
/// searched. Directories without source files for the target are not packages.
pub fn discover(root: &Path, prefix: &str, constraints: &Constraints) -> Result<Vec<RawPackage>, LoadError> {
  let mut packages = Vec::new();

  let walker = WalkDir::new(root)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !is_skipped_dir(e.file_name().to_str()));

  for entry in walker {
    let entry = entry.map_err(|e| LoadError::Walk {
      root: root.to_path_buf(),
      message: e.to_string(),
    })?;
    if !entry.file_type().is_dir() {
      continue;
    }

    let dir = entry.path();
    let raw = match load_dir(dir, constraints) {
      Ok(raw) => raw,
      Err(LoadError::NoSources { .. }) => continue,
      Err(err) => return Err(err),
    };

    let rel = dir.strip_prefix(root).unwrap_or(dir);
    let import_path = join_import_path(prefix, rel);
    debug!(import_path = %import_path, dir = %dir.display(), "discovered package");
    packages.push(raw.with_import_path(import_path));
  }

  Ok(packages)
}

fn is_skipped_dir(name: Option<&str>) -> bool {
  match name {
    Some(name) => name.starts_with('.') || name.starts_with('_') || SKIPPED_DIRS.contains(&name),
    None => true,
  }
}

fn join_import_path(prefix: &str, rel: &Path) -> String {
  let mut import_path = prefix.to_string();
  for component in rel.components() {
    import_path.push('/');
    import_path.push_str(&component.as_os_str().to_string_lossy());
  }
  import_path
}

/// Non-test source files directly in `dir` whose names match `constraints`, sorted.
fn source_files(dir: &Path, constraints: &Constraints) -> Result<Vec<String>, LoadError> {
  let entries = fs::read_dir(dir).map_err(|source| LoadError::Read {
    path: dir.to_path_buf(),
    source,
  })?;

  let mut files = Vec::new();
  for entry in entries {
    let entry = entry.map_err(|source| LoadError::Read {
      path: dir.to_path_buf(),
      source,
    })?;
    let Ok(name) = entry.file_name().into_string() else {
      continue;
    };
    let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
    if is_file && is_source_file(&name) && constraints.matches_file_name(&name) {
      files.push(name);
    }
  }

  files.sort();
  Ok(files)
}

fn is_source_file(name: &str) -> bool {
  let Some(stem) = name.strip_suffix(SOURCE_EXT).and_then(|s| s.strip_suffix('.')) else {
    return false;
  };
  !stem.is_empty() && !name.ends_with(TEST_SUFFIX) && !name.starts_with('.') && !name.starts_with('_')
}

/// Package clause and imports of one source file.
#[derive(Debug, PartialEq, Eq)]
struct Header {
  package: String,
  imports: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
  Ident(String),
  Str(String),
  Punct(char),
}

/// Lexer for the subset of the language that appears in file headers.
struct Lexer<'a> {
  chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
  fn new(src: &'a str) -> Self {
    Self {
      chars: src.chars().peekable(),
    }
  }

  fn next_token(&mut self) -> Result<Option<Token>, String> {
    loop {
      let Some(c) = self.chars.next() else {
        return Ok(None);
      };

      match c {
        c if c.is_whitespace() => continue,
        '/' if self.chars.peek() == Some(&'/') => {
          for c in self.chars.by_ref() {
            if c == '\n' {
              break;
            }
          }
        }
        '/' if self.chars.peek() == Some(&'*') => {
          self.chars.next();
          let mut prev = '\0';
          let mut closed = false;
          for c in self.chars.by_ref() {
            if prev == '*' && c == '/' {
              closed = true;
              break;
            }
            prev = c;
          }
          if !closed {
            return Err("unterminated block comment".to_string());
          }
        }
        '"' => return self.interpreted_string().map(|s| Some(Token::Str(s))),
        '`' => {
          let mut value = String::new();
          for c in self.chars.by_ref() {
            if c == '`' {
              return Ok(Some(Token::Str(value)));
            }
            value.push(c);
          }
          return Err("unterminated raw string".to_string());
        }
        c if c.is_alphanumeric() || c == '_' => {
          let mut ident = c.to_string();
          while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
              ident.push(c);
              self.chars.next();
            } else {
              break;
            }
          }
          return Ok(Some(Token::Ident(ident)));
        }
        c => return Ok(Some(Token::Punct(c))),
      }
    }
  }

  fn interpreted_string(&mut self) -> Result<String, String> {
    let mut value = String::new();
    while let Some(c) = self.chars.next() {
      match c {
        '"' => return Ok(value),
        '\\' => match self.chars.next() {
          Some(escaped) => value.push(escaped),
          None => break,
        },
        '\n' => break,
        c => value.push(c),
      }
    }
    Err("unterminated string literal".to_string())
  }
}

fn parse_header(src: &str) -> Result<Header, String> {
  let mut lexer = Lexer::new(src);

  let package = match (lexer.next_token()?, lexer.next_token()?) {
    (Some(Token::Ident(kw)), Some(Token::Ident(name))) if kw == "package" => name,
    _ => return Err("expected package clause".to_string()),
  };

  let mut imports = Vec::new();
  loop {
    match lexer.next_token()? {
      Some(Token::Punct(';')) => continue,
      Some(Token::Ident(kw)) if kw == "import" => match lexer.next_token()? {
        Some(Token::Punct('(')) => loop {
          match lexer.next_token()? {
            Some(Token::Punct(')')) => break,
            Some(Token::Punct(';')) => continue,
            Some(token) => imports.push(import_spec(token, &mut lexer)?),
            None => return Err("unterminated import block".to_string()),
          }
        },
        Some(token) => imports.push(import_spec(token, &mut lexer)?),
        None => return Err("expected import path".to_string()),
      },
      _ => break,
    }
  }

  Ok(Header { package, imports })
}

/// One import spec: an optional name (`.`, `_` or identifier) followed by the path.
fn import_spec(first: Token, lexer: &mut Lexer<'_>) -> Result<String, String> {
  match first {
    Token::Str(path) => Ok(path),
    Token::Ident(_) | Token::Punct('.') => match lexer.next_token()? {
      Some(Token::Str(path)) => Ok(path),
      _ => Err("expected import path after import name".to_string()),
    },
    other => Err(format!("unexpected token in import: {other:?}")),
  }
}
