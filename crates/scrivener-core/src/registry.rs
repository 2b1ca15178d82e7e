//! Translator Registry.
//!
//! Loading reads every definition from a source, validates each one on its
//! own and builds an immutable [`RegistrySnapshot`]. Bad definitions are
//! reported and skipped; they never abort the load. [`Registry`] holds the
//! current snapshot behind an `ArcSwap`, so a reload is one atomic pointer
//! swap and in-flight requests keep the snapshot they started with.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::engines::EngineSet;
use crate::error::ValidationError;
use crate::translator::{Manifest, TargetType, Translator};

/// Translator manifests shipped with the crate.
const BUILTIN: &[(&str, &str)] = &[
    ("doi.toml", include_str!("../translators/doi.toml")),
    ("arxiv.toml", include_str!("../translators/arxiv.toml")),
    ("pubmed.toml", include_str!("../translators/pubmed.toml")),
    ("isbn.toml", include_str!("../translators/isbn.toml")),
    (
        "embedded-metadata.toml",
        include_str!("../translators/embedded-metadata.toml"),
    ),
    (
        "example-journal.toml",
        include_str!("../translators/example-journal.toml"),
    ),
    ("formats.toml", include_str!("../translators/formats.toml")),
];

/// Where translator definitions come from.
#[derive(Debug, Clone)]
pub enum RegistrySource {
    /// Manifests embedded in the crate.
    Builtin,
    /// Every `*.toml` file in a directory, in file-name order.
    Directory(PathBuf),
    /// `(source name, manifest text)` pairs.
    Inline(Vec<(String, String)>),
    /// Several sources, in order.
    Chain(Vec<RegistrySource>),
}

impl RegistrySource {
    /// Read all definitions. Unreadable files become validation errors.
    fn read(&self, out: &mut Vec<(String, String)>, errors: &mut Vec<ValidationError>) {
        match self {
            RegistrySource::Builtin => {
                out.extend(
                    BUILTIN
                        .iter()
                        .map(|(name, text)| (name.to_string(), text.to_string())),
                );
            }
            RegistrySource::Directory(dir) => read_directory(dir, out, errors),
            RegistrySource::Inline(defs) => out.extend(defs.iter().cloned()),
            RegistrySource::Chain(sources) => {
                for source in sources {
                    source.read(out, errors);
                }
            }
        }
    }
}

/// Parse one definition file. A file holds a single manifest, or several
/// under a top-level `[[translators]]` array.
fn parse_manifests(name: &str, text: &str) -> Vec<(String, Result<Manifest, ValidationError>)> {
    fn invalid(label: &str, id: Option<&str>, e: toml::de::Error) -> ValidationError {
        ValidationError::new(label, id, format!("invalid manifest: {}", e))
    }

    let table: toml::Table = match toml::from_str(text) {
        Ok(table) => table,
        Err(e) => return vec![(name.to_string(), Err(invalid(name, None, e)))],
    };
    match table.get("translators") {
        Some(toml::Value::Array(entries)) if table.len() == 1 => entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let label = format!("{}#{}", name, i + 1);
                let id = entry.get("id").and_then(toml::Value::as_str);
                let manifest = entry
                    .clone()
                    .try_into::<Manifest>()
                    .map_err(|e| invalid(&label, id, e));
                (label, manifest)
            })
            .collect(),
        _ => {
            let id = table.get("id").and_then(toml::Value::as_str).map(String::from);
            let manifest = toml::Value::Table(table)
                .try_into::<Manifest>()
                .map_err(|e| invalid(name, id.as_deref(), e));
            vec![(name.to_string(), manifest)]
        }
    }
}

fn read_directory(dir: &Path, out: &mut Vec<(String, String)>, errors: &mut Vec<ValidationError>) {
    let source_name = dir.display().to_string();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(ValidationError::new(
                &source_name,
                None,
                format!("cannot read translator directory: {}", e),
            ));
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    for path in paths {
        let name = path.display().to_string();
        match std::fs::read_to_string(&path) {
            Ok(text) => out.push((name, text)),
            Err(e) => {
                errors.push(ValidationError::new(&name, None, format!("cannot read: {}", e)))
            }
        }
    }
}

/// Outcome of a load or reload.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub generation: u64,
    pub loaded: usize,
    pub errors: Vec<ValidationError>,
}

/// An immutable set of validated translators.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    /// Source order.
    translators: Vec<Arc<Translator>>,
    by_id: HashMap<String, usize>,
}

impl RegistrySnapshot {
    /// Validate every definition from `source`.
    ///
    /// `known_formats`, when given, restricts import/export entries to those
    /// codec ids. Duplicate ids keep the first definition.
    pub fn build(
        source: &RegistrySource,
        engines: &EngineSet,
        known_formats: Option<&[String]>,
    ) -> (RegistrySnapshot, Vec<ValidationError>) {
        let mut defs = Vec::new();
        let mut errors = Vec::new();
        source.read(&mut defs, &mut errors);

        let mut snapshot = RegistrySnapshot::default();
        for (name, manifest) in defs
            .iter()
            .flat_map(|(name, text)| parse_manifests(name, text))
        {
            let result = manifest
                .and_then(|m| Translator::from_manifest(&name, m))
                .and_then(|t| check_executable(&name, t, engines, known_formats));
            match result {
                Ok(translator) => {
                    if snapshot.by_id.contains_key(&translator.id) {
                        errors.push(ValidationError::new(
                            &name,
                            Some(&translator.id),
                            "duplicate translator id, keeping the first definition",
                        ));
                        continue;
                    }
                    snapshot
                        .by_id
                        .insert(translator.id.clone(), snapshot.translators.len());
                    snapshot.translators.push(Arc::new(translator));
                }
                Err(e) => errors.push(e),
            }
        }

        for e in &errors {
            tracing::warn!(
                source = %e.source_name,
                translator = ?e.translator,
                reason = %e.reason,
                "translator rejected"
            );
        }
        (snapshot, errors)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.translators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translators.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Translator>> {
        self.by_id.get(id).map(|&i| &self.translators[i])
    }

    pub fn all(&self) -> &[Arc<Translator>] {
        &self.translators
    }

    /// Translators of one target type, in source order.
    pub fn by_target(&self, target: TargetType) -> impl Iterator<Item = &Arc<Translator>> {
        self.translators.iter().filter(move |t| t.target == target)
    }

    /// Translators of one target type by declared priority, highest first.
    /// Ties fall back to URL-pattern specificity, then id.
    pub fn lookup(&self, target: TargetType) -> Vec<Arc<Translator>> {
        let mut found: Vec<Arc<Translator>> = self.by_target(target).cloned().collect();
        found.sort_by(|a, b| crate::detect::RankingPolicy::PriorityFirst.compare(a, b));
        found
    }

    /// The import/export translator serving `format`, if any.
    pub fn for_format(&self, target: TargetType, format: &str) -> Option<&Arc<Translator>> {
        self.by_target(target).find(|t| t.format() == Some(format))
    }
}

fn check_executable(
    name: &str,
    translator: Translator,
    engines: &EngineSet,
    known_formats: Option<&[String]>,
) -> Result<Translator, ValidationError> {
    let invalid = |reason: String| ValidationError::new(name, Some(&translator.id), reason);

    if let Some(engine_name) = translator.engine_name() {
        let engine = engines
            .get(engine_name)
            .ok_or_else(|| invalid(format!("unknown engine '{}'", engine_name)))?;
        if let Some(payload) = translator.payload() {
            engine
                .validate(payload)
                .map_err(|e| invalid(format!("invalid {} payload: {}", engine_name, e)))?;
        }
    }
    if let (Some(format), Some(known)) = (translator.format(), known_formats)
        && !known.iter().any(|k| k == format)
    {
        return Err(invalid(format!("unknown format '{}'", format)));
    }
    Ok(translator)
}

/// The live registry: the current snapshot plus what is needed to rebuild it.
pub struct Registry {
    current: ArcSwap<RegistrySnapshot>,
    engines: Arc<EngineSet>,
    known_formats: Option<Vec<String>>,
    generation: AtomicU64,
}

impl Registry {
    /// An empty registry; call [`Registry::load`] to populate it.
    pub fn new(engines: Arc<EngineSet>) -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            engines,
            known_formats: None,
            generation: AtomicU64::new(0),
        }
    }

    /// Restrict import/export translators to these codec ids.
    pub fn with_known_formats(mut self, formats: Vec<String>) -> Self {
        self.known_formats = Some(formats);
        self
    }

    pub fn engines(&self) -> &Arc<EngineSet> {
        &self.engines
    }

    /// Build a new snapshot from `source` and swap it in.
    pub fn load(&self, source: &RegistrySource) -> LoadReport {
        let (mut snapshot, errors) =
            RegistrySnapshot::build(source, &self.engines, self.known_formats.as_deref());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        snapshot.generation = generation;
        let loaded = snapshot.len();
        self.current.store(Arc::new(snapshot));

        tracing::info!(generation, loaded, rejected = errors.len(), "translator registry loaded");
        LoadReport {
            generation,
            loaded,
            errors,
        }
    }

    /// Rebuild from `source`. Readers holding the previous snapshot keep it
    /// until they drop it.
    pub fn reload(&self, source: &RegistrySource) -> LoadReport {
        self.load(source)
    }

    /// The current snapshot. Hold on to it for the whole request.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn lookup(&self, target: TargetType) -> Vec<Arc<Translator>> {
        self.snapshot().lookup(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(id: &str, priority: i32) -> (String, String) {
        (
            format!("{}.toml", id),
            format!("id='{id}'\nlabel='{id}'\ntarget='search'\npriority={priority}\nengine='doi'\n[detect]\nscheme='doi'\n[capabilities]\nfetch=true\n"),
        )
    }

    #[test]
    fn builtin_set_loads_cleanly() {
        let registry = Registry::new(Arc::new(EngineSet::builtin())).with_known_formats(
            ["bibtex", "ris", "csljson", "json", "csv"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        let report = registry.load(&RegistrySource::Builtin);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        let snap = registry.snapshot();
        assert!(snap.get("doi").is_some());
        assert!(snap.get("embedded-metadata").is_some());
        assert!(snap.for_format(TargetType::Export, "csv").is_some());
        assert!(snap.for_format(TargetType::Import, "csv").is_none());
    }

    #[test]
    fn bad_entries_are_reported_not_fatal() {
        let defs = vec![
            search("good", 100),
            ("broken.toml".into(), "id = ".into()),
            search("good", 50),
            (
                "no-engine.toml".into(),
                "id='x'\nlabel='x'\ntarget='search'\nengine='teleport'\n[detect]\nscheme='doi'\n".into(),
            ),
        ];
        let (snap, errors) =
            RegistrySnapshot::build(&RegistrySource::Inline(defs), &EngineSet::builtin(), None);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("good").unwrap().priority, 100);
        assert_eq!(errors.len(), 3);
        assert!(errors[1].reason.contains("duplicate"));
        assert!(errors[2].reason.contains("teleport"));
    }

    #[test]
    fn lookup_orders_by_priority() {
        let defs = vec![search("low", 10), search("high", 300), search("mid", 100)];
        let (snap, _) =
            RegistrySnapshot::build(&RegistrySource::Inline(defs), &EngineSet::builtin(), None);
        let ids: Vec<String> = snap
            .lookup(TargetType::Search)
            .iter()
            .map(|t| t.id.clone())
            .collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
        assert!(snap.lookup(TargetType::Web).is_empty());
    }

    #[test]
    fn unknown_formats_rejected_when_known_set_given() {
        let defs = vec![(
            "f.toml".to_string(),
            "id='marc'\nlabel='MARC'\ntarget='import'\nformat='marc'\n".to_string(),
        )];
        let known = vec!["ris".to_string()];
        let (snap, errors) = RegistrySnapshot::build(
            &RegistrySource::Inline(defs),
            &EngineSet::builtin(),
            Some(known.as_slice()),
        );
        assert!(snap.is_empty());
        assert!(errors[0].reason.contains("marc"));
    }

    #[test]
    fn reload_swaps_snapshot_but_old_one_survives() {
        let registry = Registry::new(Arc::new(EngineSet::builtin()));
        registry.load(&RegistrySource::Inline(vec![search("a", 1)]));
        let old = registry.snapshot();
        let report = registry.load(&RegistrySource::Inline(vec![search("b", 1)]));
        assert_eq!(report.generation, 2);
        assert!(old.get("a").is_some());
        assert!(registry.snapshot().get("a").is_none());
        assert!(registry.snapshot().get("b").is_some());
    }

    #[test]
    fn directory_source_reads_toml_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (_, a) = search("alpha", 1);
        let (_, b) = search("beta", 1);
        std::fs::write(dir.path().join("b.toml"), b).unwrap();
        std::fs::write(dir.path().join("a.toml"), a).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (snap, errors) = RegistrySnapshot::build(
            &RegistrySource::Directory(dir.path().to_path_buf()),
            &EngineSet::builtin(),
            None,
        );
        assert!(errors.is_empty());
        let ids: Vec<&str> = snap.all().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);

        let (_, errors) = RegistrySnapshot::build(
            &RegistrySource::Directory(dir.path().join("missing")),
            &EngineSet::builtin(),
            None,
        );
        assert_eq!(errors.len(), 1);
    }
}
