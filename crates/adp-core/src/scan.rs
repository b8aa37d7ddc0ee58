//! Scan driver
//!
//! Runs the per-file pipeline (locate → resolve → extract → validate → build)
//! for every input on a rayon pool, then hands the batches to the assembler.
//!
//! Per-file work shares only read-only state: the language registry, the
//! compiled structural patterns and the schema. A file that cannot be read,
//! is too large or runs past its time budget contributes one Error
//! diagnostic and no entities; the run itself always completes unless it is
//! cancelled.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ignore::WalkBuilder;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assembler::{assemble, AnnotatedEntity, AssemblerConfig, FileBatch};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSummary};
use crate::entity::{self, declared_relationships, RelationshipFields};
use crate::extractor::{self, DEFAULT_MARKER};
use crate::graph::KnowledgeGraph;
use crate::language::{LanguageProfile, LanguageRegistry};
use crate::locator::locate_with_index;
use crate::schema::Schema;
use crate::scope::{StructuralIndex, StructuralPatterns};
use crate::source::{normalize_path, LineIndex};
use crate::validator::{self, ValidationMode};

/// Default upper bound on the size of a scanned file.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

/// Ignore file honored next to `.gitignore`.
pub const IGNORE_FILE_NAME: &str = ".adpignore";

/// Directories that are never scanned.
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/target/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/venv/**",
    "**/dist/**",
    "**/build/**",
];

/// Errors that stop a whole run.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan cancelled")]
    Cancelled,

    #[error("invalid exclude pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("cannot walk {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("language profile '{language}' has invalid structural keywords: {source}")]
    Profile {
        language: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to build scan thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

// ============================================================================
// Options
// ============================================================================

/// Settings for one scan run.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Token that introduces a payload inside a comment
    pub marker: String,
    pub mode: ValidationMode,
    pub relationships: RelationshipFields,
    pub assembler: AssemblerConfig,
    /// Files larger than this are skipped (0 = no limit)
    pub max_file_bytes: u64,
    /// Per-file time budget
    pub file_timeout: Option<Duration>,
    /// Worker threads (0 = rayon's global pool)
    pub parallelism: usize,
    /// Extra glob patterns excluded from directory walks
    pub excludes: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            mode: ValidationMode::default(),
            relationships: RelationshipFields::default(),
            assembler: AssemblerConfig::default(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            file_timeout: None,
            parallelism: 0,
            excludes: Vec::new(),
        }
    }
}

/// Cooperative cancellation flag shared between the host and a running scan.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One file handed to the engine.
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub path: String,
    pub text: String,
    pub profile: Arc<LanguageProfile>,
}

impl SourceInput {
    pub fn new(
        path: impl Into<String>,
        text: impl Into<String>,
        profile: Arc<LanguageProfile>,
    ) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            profile,
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub graph: KnowledgeGraph,
    /// Every diagnostic of the run, in report order
    pub diagnostics: Vec<Diagnostic>,
    pub files_scanned: usize,
}

impl ScanReport {
    pub fn summary(&self) -> DiagnosticSummary {
        DiagnosticSummary::from_diagnostics(&self.diagnostics)
    }

    /// Caller policy: errors always fail, warnings fail in strict mode.
    pub fn has_failures(&self, strict: bool) -> bool {
        self.summary().fails(strict)
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// Runs scans with a fixed registry, schema and options.
#[derive(Debug)]
pub struct Scanner {
    registry: LanguageRegistry,
    schema: Arc<Schema>,
    options: ScanOptions,
    patterns: HashMap<String, Arc<StructuralPatterns>>,
}

impl Scanner {
    /// Create a scanner, compiling structural patterns for every registered
    /// language up front.
    pub fn new(
        registry: LanguageRegistry,
        schema: Arc<Schema>,
        options: ScanOptions,
    ) -> Result<Self, ScanError> {
        let mut patterns = HashMap::new();
        for profile in registry.profiles() {
            let compiled =
                StructuralPatterns::compile(&profile).map_err(|source| ScanError::Profile {
                    language: profile.name.clone(),
                    source,
                })?;
            patterns.insert(profile.name.clone(), Arc::new(compiled));
        }
        Ok(Self {
            registry,
            schema,
            options,
            patterns,
        })
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    fn patterns_for(&self, profile: &LanguageProfile) -> Result<Arc<StructuralPatterns>, regex::Error> {
        match self.patterns.get(&profile.name) {
            Some(patterns) => Ok(patterns.clone()),
            None => StructuralPatterns::compile(profile).map(Arc::new),
        }
    }

    /// Run the per-file pipeline over one input. Pure: reads nothing but the
    /// input and touches no shared mutable state.
    pub fn scan_source(&self, input: &SourceInput) -> FileBatch {
        let path = normalize_path(&input.path);
        let started = Instant::now();
        let profile = input.profile.as_ref();

        let patterns = match self.patterns_for(profile) {
            Ok(patterns) => patterns,
            Err(e) => {
                return FileBatch::failed(
                    &path,
                    Diagnostic::file_level(
                        DiagnosticCode::ExtractorError,
                        format!("language profile '{}' is unusable: {}", profile.name, e),
                        &path,
                    ),
                );
            }
        };

        let lines = Arc::new(LineIndex::new(&input.text));
        let index = StructuralIndex::build(&input.text, profile, &patterns);
        let mut batch = FileBatch::new(&path);
        let mut spans = 0usize;

        for span in locate_with_index(&input.text, profile, lines.clone()) {
            if let Some(budget) = self.options.file_timeout {
                if started.elapsed() >= budget {
                    warn!("Timed out scanning {}", path);
                    return FileBatch::failed(
                        &path,
                        Diagnostic::file_level(
                            DiagnosticCode::Timeout,
                            format!("scan exceeded the {}ms time budget", budget.as_millis()),
                            &path,
                        ),
                    );
                }
            }
            spans += 1;

            if let Some(warning) = span.unterminated_warning(&path) {
                batch.diagnostics.push(warning);
            }

            let payload = match extractor::extract(&span, &lines, &self.options.marker, &path) {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(diagnostic) => {
                    batch.diagnostics.push(diagnostic);
                    continue;
                }
            };

            let scope = index.resolve(&span);
            let validated = validator::validate(&payload, &self.schema, self.options.mode, &path);
            batch.diagnostics.extend(validated.diagnostics);

            let entity = entity::build(&path, &scope, validated.fields);
            let relationships = declared_relationships(&entity, &self.options.relationships);
            batch.entities.push(AnnotatedEntity {
                entity,
                relationships,
            });
        }

        debug!(
            "{}: {} comment spans, {} annotations, {} diagnostics",
            path,
            spans,
            batch.entities.len(),
            batch.diagnostics.len()
        );
        batch
    }

    /// Scan in-memory inputs and assemble the graph.
    pub fn scan(
        &self,
        inputs: &[SourceInput],
        cancel: &CancellationToken,
    ) -> Result<ScanReport, ScanError> {
        let batches = self.run_parallel(inputs, cancel, |input| self.scan_source(input))?;
        Ok(self.finish(batches))
    }

    /// Walk `root`, read every supported file and scan it.
    ///
    /// Entity paths are relative to `root` (or to its parent when `root` is a
    /// single file).
    pub fn scan_paths(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<ScanReport, ScanError> {
        let files = collect_files(root, &self.registry, &self.options.excludes)?;
        info!("Found {} files to scan under {}", files.len(), root.display());

        let base = if root.is_file() {
            root.parent().unwrap_or(root)
        } else {
            root
        };
        let batches = self.run_parallel(&files, cancel, |file| self.scan_file(file, base))?;
        Ok(self.finish(batches))
    }

    fn scan_file(&self, file: &Path, base: &Path) -> FileBatch {
        let rel = normalize_path(&file.strip_prefix(base).unwrap_or(file).to_string_lossy());

        let Some(profile) = self.registry.for_path(file) else {
            return FileBatch::new(&rel);
        };

        if self.options.max_file_bytes > 0 {
            if let Ok(meta) = std::fs::metadata(file) {
                if meta.len() > self.options.max_file_bytes {
                    return FileBatch::failed(
                        &rel,
                        Diagnostic::file_level(
                            DiagnosticCode::IoError,
                            format!(
                                "file is {} bytes, above the {} byte limit; skipped",
                                meta.len(),
                                self.options.max_file_bytes
                            ),
                            &rel,
                        ),
                    );
                }
            }
        }

        match std::fs::read_to_string(file) {
            Ok(text) => self.scan_source(&SourceInput::new(rel, text, profile)),
            Err(e) => {
                warn!("Failed to read {}: {}", file.display(), e);
                FileBatch::failed(
                    &rel,
                    Diagnostic::file_level(
                        DiagnosticCode::IoError,
                        format!("cannot read file: {}", e),
                        &rel,
                    ),
                )
            }
        }
    }

    /// Map every item to a batch on the pool. Returns `Cancelled` instead of a
    /// partial result when the token fires.
    fn run_parallel<T, F>(
        &self,
        items: &[T],
        cancel: &CancellationToken,
        scan_one: F,
    ) -> Result<Vec<FileBatch>, ScanError>
    where
        T: Sync,
        F: Fn(&T) -> FileBatch + Sync + Send,
    {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let run = || {
            items
                .par_iter()
                .map(|item| (!cancel.is_cancelled()).then(|| scan_one(item)))
                .collect::<Option<Vec<FileBatch>>>()
        };

        let batches = if self.options.parallelism > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.parallelism)
                .build()?
                .install(run)
        } else {
            run()
        };

        match batches {
            Some(batches) if !cancel.is_cancelled() => Ok(batches),
            _ => Err(ScanError::Cancelled),
        }
    }

    fn finish(&self, batches: Vec<FileBatch>) -> ScanReport {
        let files_scanned = batches.len();
        let (graph, diagnostics) = assemble(batches, &self.options.assembler);
        ScanReport {
            graph,
            diagnostics,
            files_scanned,
        }
    }
}

// ============================================================================
// File Collection
// ============================================================================

fn build_exclude_glob_set(patterns: &[String]) -> Result<globset::GlobSet, ScanError> {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::Glob::new(pattern).map_err(|source| ScanError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    for pattern in DEFAULT_EXCLUDES {
        if let Ok(glob) = globset::Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().map_err(|source| ScanError::InvalidGlob {
        pattern: patterns.join(", "),
        source,
    })
}

/// Collect supported source files under `root`, sorted.
///
/// Respects `.gitignore`, `.adpignore` and the given exclude globs (matched
/// against the path relative to `root`). Hidden entries are skipped.
pub fn collect_files(
    root: &Path,
    registry: &LanguageRegistry,
    excludes: &[String],
) -> Result<Vec<PathBuf>, ScanError> {
    if !root.exists() {
        return Err(ScanError::Walk {
            path: root.to_path_buf(),
            message: "path does not exist".to_string(),
        });
    }
    let glob_set = build_exclude_glob_set(excludes)?;

    if root.is_file() {
        return Ok(registry
            .for_path(root)
            .map(|_| vec![root.to_path_buf()])
            .unwrap_or_default());
    }

    let walker = WalkBuilder::new(root)
        .follow_links(false)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .add_custom_ignore_filename(IGNORE_FILE_NAME)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("Error walking directory: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        if registry.for_path(path).is_none() {
            continue;
        }
        let rel_path = path.strip_prefix(root).unwrap_or(path).to_string_lossy();
        if glob_set.is_match(rel_path.as_ref()) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaField, ValueKind};
    use crate::scope::ScopeKind;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new("test", "1")
                .with_field(SchemaField::new("description", ValueKind::String).required())
                .with_field(SchemaField::new("domain", ValueKind::String))
                .with_field(SchemaField::new("dependencies", ValueKind::Array).items(ValueKind::String)),
        )
    }

    fn scanner(options: ScanOptions) -> Scanner {
        Scanner::new(LanguageRegistry::with_builtins(), schema(), options).unwrap()
    }

    fn python(path: &str, text: &str) -> SourceInput {
        let profile = LanguageRegistry::with_builtins().by_name("python").unwrap();
        SourceInput::new(path, text, profile)
    }

    const BILLING: &str = "\
# @ai-metadata {\"description\": \"Billing service\", \"domain\": \"billing\"}
class Billing:
    def charge(self):
        pass
";

    // ========================================================================
    // Pipeline Tests
    // ========================================================================

    #[test]
    fn test_scan_source_builds_entity() {
        let batch = scanner(ScanOptions::default()).scan_source(&python("src/billing.py", BILLING));

        assert!(batch.diagnostics.is_empty(), "{:?}", batch.diagnostics);
        assert_eq!(batch.entities.len(), 1);
        let entity = &batch.entities[0].entity;
        assert_eq!(entity.scope.kind, ScopeKind::Class);
        assert_eq!(entity.name, "Billing");
        assert_eq!(entity.domain.as_deref(), Some("billing"));
        assert_eq!(entity.file, "src/billing.py");
    }

    #[test]
    fn test_comment_without_marker_is_ignored() {
        let batch = scanner(ScanOptions::default())
            .scan_source(&python("a.py", "# just a note\nx = 1\n"));
        assert!(batch.entities.is_empty());
        assert!(batch.diagnostics.is_empty());
    }

    #[test]
    fn test_custom_marker() {
        let options = ScanOptions {
            marker: "@meta".to_string(),
            ..ScanOptions::default()
        };
        let text = "# @meta {\"description\": \"x\"}\ndef run():\n    pass\n";
        let batch = scanner(options).scan_source(&python("a.py", text));
        assert_eq!(batch.entities.len(), 1);
        assert_eq!(batch.entities[0].entity.scope.kind, ScopeKind::Function);
    }

    #[test]
    fn test_zero_timeout_discards_file() {
        let options = ScanOptions {
            file_timeout: Some(Duration::ZERO),
            ..ScanOptions::default()
        };
        let batch = scanner(options).scan_source(&python("slow.py", BILLING));
        assert!(batch.entities.is_empty());
        assert_eq!(batch.diagnostics.len(), 1);
        assert_eq!(batch.diagnostics[0].code, DiagnosticCode::Timeout);
    }

    // ========================================================================
    // Run Tests
    // ========================================================================

    #[test]
    fn test_scan_assembles_across_files() {
        let inputs = vec![
            python(
                "checkout.py",
                "# @ai-metadata {\"description\": \"c\", \"dependencies\": [\"Billing\", \"Ghost\"]}\nclass Checkout:\n    pass\n",
            ),
            python("billing.py", BILLING),
        ];
        let report = scanner(ScanOptions::default())
            .scan(&inputs, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.graph.entity_count(), 2);
        assert_eq!(report.graph.dependency_edge_count(), 1);
        assert_eq!(report.graph.dangling().count(), 1);
        let summary = report.summary();
        assert_eq!((summary.errors, summary.warnings), (0, 1));
        assert!(!report.has_failures(false));
        assert!(report.has_failures(true));
    }

    #[test]
    fn test_cancelled_scan_returns_no_graph() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = scanner(ScanOptions::default()).scan(&[python("a.py", BILLING)], &cancel);
        assert!(matches!(result, Err(ScanError::Cancelled)));
    }

    #[test]
    fn test_dedicated_pool() {
        let options = ScanOptions {
            parallelism: 2,
            ..ScanOptions::default()
        };
        let report = scanner(options)
            .scan(&[python("a.py", BILLING)], &CancellationToken::new())
            .unwrap();
        assert_eq!(report.graph.entity_count(), 1);
    }

    // ========================================================================
    // Filesystem Tests
    // ========================================================================

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/gen")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("src/b.py"), "").unwrap();
        fs::write(dir.path().join("src/a.ts"), "").unwrap();
        fs::write(dir.path().join("src/notes.txt"), "").unwrap();
        fs::write(dir.path().join("src/gen/out.py"), "").unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "").unwrap();

        let files = collect_files(
            dir.path(),
            &LanguageRegistry::with_builtins(),
            &["src/gen/**".to_string()],
        )
        .unwrap();
        let rel: Vec<String> = files
            .iter()
            .map(|f| {
                normalize_path(&f.strip_prefix(dir.path()).unwrap().to_string_lossy())
            })
            .collect();
        assert_eq!(rel, vec!["src/a.ts", "src/b.py"]);
    }

    #[test]
    fn test_invalid_glob_and_missing_root() {
        let dir = TempDir::new().unwrap();
        let registry = LanguageRegistry::with_builtins();
        let err = collect_files(dir.path(), &registry, &["a[".to_string()]).unwrap_err();
        assert!(matches!(err, ScanError::InvalidGlob { .. }));

        let err = collect_files(&dir.path().join("nope"), &registry, &[]).unwrap_err();
        assert!(matches!(err, ScanError::Walk { .. }));
    }

    #[test]
    fn test_scan_paths_reports_oversized_and_invalid_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("billing.py"), BILLING).unwrap();
        fs::write(dir.path().join("big.py"), "x = 1\n".repeat(100)).unwrap();
        fs::write(dir.path().join("bad.py"), [0xff, 0xfe, 0x00]).unwrap();

        let options = ScanOptions {
            max_file_bytes: 200,
            ..ScanOptions::default()
        };
        let report = scanner(options)
            .scan_paths(dir.path(), &CancellationToken::new())
            .unwrap();

        assert_eq!(report.files_scanned, 3);
        assert_eq!(report.graph.entity_count(), 1);
        let failed: Vec<(&str, DiagnosticCode)> = report
            .diagnostics
            .iter()
            .map(|d| (d.file.as_str(), d.code))
            .collect();
        assert_eq!(
            failed,
            vec![
                ("bad.py", DiagnosticCode::IoError),
                ("big.py", DiagnosticCode::IoError),
            ]
        );
    }
}
