//! Standard-library and synthetic import detection.
//!
//! Standard-library packages ship prebuilt with the toolchain; they never
//! become graph nodes. Synthetic imports (`C` for foreign calls, `unsafe` for
//! raw memory access) are handled by the compiler itself and have no archive.

/// First path elements of standard-library packages.
const STANDARD_ROOTS: &[&str] = &[
  "archive",
  "bufio",
  "builtin",
  "bytes",
  "cmp",
  "compress",
  "container",
  "context",
  "crypto",
  "database",
  "debug",
  "embed",
  "encoding",
  "errors",
  "expvar",
  "flag",
  "fmt",
  "go",
  "hash",
  "html",
  "image",
  "index",
  "internal",
  "io",
  "iter",
  "log",
  "maps",
  "math",
  "mime",
  "net",
  "os",
  "path",
  "plugin",
  "reflect",
  "regexp",
  "runtime",
  "slices",
  "sort",
  "strconv",
  "strings",
  "structs",
  "sync",
  "syscall",
  "testing",
  "text",
  "time",
  "unicode",
  "unique",
  "unsafe",
  "weak",
];

/// Import names the compiler provides without an archive.
const SYNTHETIC: &[&str] = &["C", "unsafe"];

/// Whether `import_path` belongs to the standard library.
pub fn is_standard(import_path: &str) -> bool {
  let root = import_path.split('/').next().unwrap_or(import_path);
  STANDARD_ROOTS.contains(&root)
}

/// Whether `import_path` is a compiler-provided pseudo package.
pub fn is_synthetic(import_path: &str) -> bool {
  SYNTHETIC.contains(&import_path)
}

/// Whether an import is left out of the package graph entirely.
pub fn is_elided(import_path: &str) -> bool {
  is_synthetic(import_path) || is_standard(import_path)
}
