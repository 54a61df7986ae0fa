// src/history.rs
//
// Per-scene step history.
//
// The recorder holds at most one open step record. A record is persisted when
// it is closed, which the session does when the next step is accepted or when
// the scene ends, so annotations attached after a step returns still land in
// that step's record.
//
// Persistence goes through the narrow HistoryStore / HistoryTarget interface:
// - JsonlHistoryStore: one newline-delimited JSON file per scene
// - MemoryHistoryStore: shared in-process store for tests and replays
// - NullHistoryStore: discards everything (screenshot scenes, history off)

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::observation::ObservationSnapshot;
use crate::params::ValidatedParameters;
use crate::tier::MetadataTier;
use crate::types::RawParams;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history io error: {0}")]
    Io(#[from] io::Error),
    #[error("history serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("history target is sealed")]
    Sealed,
    #[error("a history record is already open")]
    RecordAlreadyOpen,
    #[error("no history record is open")]
    NoOpenRecord,
}

/// First line of every scene history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneHeader {
    /// Scene name without a trailing `.json`.
    pub name: String,
    /// Unix seconds at scene start.
    pub timestamp: u64,
    pub team: String,
    /// Tier the scene's snapshots were filtered at.
    pub metadata_tier: MetadataTier,
}

/// One completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u32,
    /// Engine-side action name.
    pub action: String,
    pub args: RawParams,
    pub params: ValidatedParameters,
    /// Snapshot without image buffers or next-step action list.
    pub output: ObservationSnapshot,
    pub classification: Option<String>,
    pub confidence: Option<f64>,
    pub violations_xy_list: Option<Vec<JsonValue>>,
    pub internal_state: Option<JsonValue>,
}

/// Last line of every finalized scene history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTrailer {
    pub classification: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryLine {
    Scene(SceneHeader),
    Step(StepRecord),
    Score(ScoreTrailer),
}

/// Append target for one scene. Never reopened once sealed.
pub trait HistoryTarget {
    fn append(&mut self, line: &HistoryLine) -> Result<(), HistoryError>;

    /// Store an opaque named blob (e.g. a heatmap image) next to the history.
    fn put_artifact(&mut self, name: &str, bytes: &[u8]) -> Result<(), HistoryError>;

    fn seal(&mut self) -> Result<(), HistoryError>;
}

/// Creates one target per scene.
pub trait HistoryStore {
    fn open_target(&mut self, header: &SceneHeader) -> Result<Box<dyn HistoryTarget>, HistoryError>;
}

// ---------------------------------------------------------------------------
// JSONL files
// ---------------------------------------------------------------------------

/// Upper bound on `-<n>` suffixes tried when a history file name is taken.
const MAX_SUFFIX_ATTEMPTS: u32 = 1000;

/// Writes `<dir>/<scene name>-<timestamp>.jsonl` per scene. A scene whose
/// file name is already taken gets `-<timestamp>-<n>.jsonl` instead; an
/// existing file is never reopened.
#[derive(Debug, Clone)]
pub struct JsonlHistoryStore {
    dir: PathBuf,
}

impl JsonlHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Preferred path of the history file for a scene header.
    pub fn path_for(&self, header: &SceneHeader) -> PathBuf {
        self.dir
            .join(format!("{}-{}.jsonl", header.name, header.timestamp))
    }

    fn suffixed_path(&self, header: &SceneHeader, n: u32) -> PathBuf {
        self.dir
            .join(format!("{}-{}-{}.jsonl", header.name, header.timestamp, n))
    }

    /// Create a fresh history file, skipping names already on disk.
    fn create_unique(&self, header: &SceneHeader) -> Result<(PathBuf, File), HistoryError> {
        let mut path = self.path_for(header);
        for n in 1..=MAX_SUFFIX_ATTEMPTS {
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    path = self.suffixed_path(header, n);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free history file name for scene {:?}", header.name),
        )
        .into())
    }
}

impl HistoryStore for JsonlHistoryStore {
    fn open_target(&mut self, header: &SceneHeader) -> Result<Box<dyn HistoryTarget>, HistoryError> {
        // Scene names may contain '/', so create the full parent chain.
        if let Some(parent) = self.path_for(header).parent() {
            fs::create_dir_all(parent)?;
        }
        let (path, file) = self.create_unique(header)?;
        let mut target = JsonlTarget {
            path,
            writer: Some(BufWriter::new(file)),
        };
        target.append(&HistoryLine::Scene(header.clone()))?;
        Ok(Box::new(target))
    }
}

#[derive(Debug)]
pub struct JsonlTarget {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl JsonlTarget {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryTarget for JsonlTarget {
    fn append(&mut self, line: &HistoryLine) -> Result<(), HistoryError> {
        let writer = self.writer.as_mut().ok_or(HistoryError::Sealed)?;
        let text = serde_json::to_string(line)?;
        writeln!(writer, "{}", text)?;
        writer.flush()?;
        Ok(())
    }

    fn put_artifact(&mut self, name: &str, bytes: &[u8]) -> Result<(), HistoryError> {
        if self.writer.is_none() {
            return Err(HistoryError::Sealed);
        }
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    fn seal(&mut self) -> Result<(), HistoryError> {
        let mut writer = self.writer.take().ok_or(HistoryError::Sealed)?;
        writer.flush()?;
        Ok(())
    }
}

impl Drop for JsonlTarget {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Everything persisted for one scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredScene {
    pub header: Option<SceneHeader>,
    pub lines: Vec<HistoryLine>,
    pub artifacts: Vec<(String, Vec<u8>)>,
    pub sealed: bool,
}

impl StoredScene {
    pub fn steps(&self) -> Vec<&StepRecord> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                HistoryLine::Step(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    pub fn score(&self) -> Option<&ScoreTrailer> {
        self.lines.iter().find_map(|line| match line {
            HistoryLine::Score(score) => Some(score),
            _ => None,
        })
    }
}

/// Thread-safe in-memory store. Clones share the same scenes.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    scenes: Arc<Mutex<Vec<StoredScene>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scenes(&self) -> Vec<StoredScene> {
        self.scenes.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn open_target(&mut self, header: &SceneHeader) -> Result<Box<dyn HistoryTarget>, HistoryError> {
        let mut scenes = self
            .scenes
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "history store lock poisoned"))?;
        scenes.push(StoredScene {
            header: Some(header.clone()),
            lines: vec![HistoryLine::Scene(header.clone())],
            ..Default::default()
        });
        Ok(Box::new(MemoryTarget {
            scenes: Arc::clone(&self.scenes),
            index: scenes.len() - 1,
        }))
    }
}

struct MemoryTarget {
    scenes: Arc<Mutex<Vec<StoredScene>>>,
    index: usize,
}

impl MemoryTarget {
    fn with_scene<T>(
        &self,
        f: impl FnOnce(&mut StoredScene) -> Result<T, HistoryError>,
    ) -> Result<T, HistoryError> {
        let mut scenes = self
            .scenes
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "history store lock poisoned"))?;
        let scene = scenes
            .get_mut(self.index)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "history scene missing"))?;
        if scene.sealed {
            return Err(HistoryError::Sealed);
        }
        f(scene)
    }
}

impl HistoryTarget for MemoryTarget {
    fn append(&mut self, line: &HistoryLine) -> Result<(), HistoryError> {
        self.with_scene(|scene| {
            scene.lines.push(line.clone());
            Ok(())
        })
    }

    fn put_artifact(&mut self, name: &str, bytes: &[u8]) -> Result<(), HistoryError> {
        self.with_scene(|scene| {
            scene.artifacts.push((name.to_string(), bytes.to_vec()));
            Ok(())
        })
    }

    fn seal(&mut self) -> Result<(), HistoryError> {
        self.with_scene(|scene| {
            scene.sealed = true;
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Null
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct NullHistoryStore;

impl HistoryStore for NullHistoryStore {
    fn open_target(&mut self, _header: &SceneHeader) -> Result<Box<dyn HistoryTarget>, HistoryError> {
        Ok(Box::new(NullTarget))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullTarget;

impl HistoryTarget for NullTarget {
    fn append(&mut self, _line: &HistoryLine) -> Result<(), HistoryError> {
        Ok(())
    }

    fn put_artifact(&mut self, _name: &str, _bytes: &[u8]) -> Result<(), HistoryError> {
        Ok(())
    }

    fn seal(&mut self) -> Result<(), HistoryError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Holds the scene's target and its single open step record.
pub struct HistoryRecorder {
    target: Option<Box<dyn HistoryTarget>>,
    open: Option<StepRecord>,
    sealed: bool,
}

impl HistoryRecorder {
    pub fn new(target: Box<dyn HistoryTarget>) -> Self {
        Self {
            target: Some(target),
            open: None,
            sealed: false,
        }
    }

    /// Recorder that persists nothing.
    pub fn disabled() -> Self {
        Self {
            target: None,
            open: None,
            sealed: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Drop the target after a persistence failure. Records are still
    /// tracked in memory so the step protocol is unaffected.
    pub fn disable(&mut self) {
        self.target = None;
    }

    pub fn open_record(&mut self, record: StepRecord) -> Result<(), HistoryError> {
        if self.sealed {
            return Err(HistoryError::Sealed);
        }
        if self.open.is_some() {
            return Err(HistoryError::RecordAlreadyOpen);
        }
        self.open = Some(record);
        Ok(())
    }

    pub fn has_open_record(&self) -> bool {
        self.open.is_some()
    }

    /// The open record, for attaching annotations before it is persisted.
    pub fn open_record_mut(&mut self) -> Option<&mut StepRecord> {
        self.open.as_mut()
    }

    /// Persist and release the open record.
    pub fn close_and_persist(&mut self) -> Result<(), HistoryError> {
        let record = self.open.take().ok_or(HistoryError::NoOpenRecord)?;
        match self.target.as_mut() {
            Some(target) => target.append(&HistoryLine::Step(record)),
            None => Ok(()),
        }
    }

    pub fn put_artifact(&mut self, name: &str, bytes: &[u8]) -> Result<(), HistoryError> {
        if self.sealed {
            return Err(HistoryError::Sealed);
        }
        match self.target.as_mut() {
            Some(target) => target.put_artifact(name, bytes),
            None => Ok(()),
        }
    }

    /// Close any open record, write the score trailer and seal the target.
    ///
    /// Sealing happens even if persisting the record or trailer fails; the
    /// first error is returned.
    pub fn finalize(&mut self, classification: Option<&str>, confidence: f64) -> Result<(), HistoryError> {
        if self.sealed {
            return Err(HistoryError::Sealed);
        }
        let mut result = Ok(());
        if self.open.is_some() {
            result = self.close_and_persist();
        }
        self.sealed = true;
        let Some(mut target) = self.target.take() else {
            return result;
        };
        let trailer = HistoryLine::Score(ScoreTrailer {
            classification: classification.map(str::to_string),
            confidence,
        });
        result
            .and(target.append(&trailer))
            .and(target.seal())
    }
}

impl std::fmt::Debug for HistoryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRecorder")
            .field("enabled", &self.target.is_some())
            .field("open", &self.open.as_ref().map(|r| r.step))
            .field("sealed", &self.sealed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::TargetVector;
    use serde_json::json;

    fn header(name: &str) -> SceneHeader {
        SceneHeader {
            name: name.into(),
            timestamp: 1_700_000_000,
            team: "team".into(),
            metadata_tier: MetadataTier::Level2,
        }
    }

    fn record(step: u32) -> StepRecord {
        StepRecord {
            step,
            action: "MoveAhead".into(),
            args: RawParams::new(),
            params: ValidatedParameters {
                rotation: 0.0,
                horizon: 0.0,
                amount: 0.5,
                force: 0.5,
                move_magnitude: 0.1,
                object_id: None,
                receptacle_object_id: None,
                object_target: TargetVector::ImageCoords { x: 0.0, y: 0.0 },
                receptacle_target: TargetVector::ImageCoords { x: 0.0, y: 0.0 },
            },
            output: ObservationSnapshot::default(),
            classification: None,
            confidence: None,
            violations_xy_list: None,
            internal_state: None,
        }
    }

    #[test]
    fn only_one_record_may_be_open() {
        let mut recorder = HistoryRecorder::new(Box::new(NullTarget));
        recorder.open_record(record(1)).unwrap();
        assert!(matches!(
            recorder.open_record(record(2)),
            Err(HistoryError::RecordAlreadyOpen)
        ));
        recorder.close_and_persist().unwrap();
        assert!(matches!(
            recorder.close_and_persist(),
            Err(HistoryError::NoOpenRecord)
        ));
        recorder.open_record(record(2)).unwrap();
    }

    #[test]
    fn annotations_before_close_are_persisted() {
        let mut store = MemoryHistoryStore::new();
        let mut recorder = HistoryRecorder::new(store.open_target(&header("s")).unwrap());
        recorder.open_record(record(1)).unwrap();
        if let Some(open) = recorder.open_record_mut() {
            open.classification = Some("plausible".into());
            open.confidence = Some(0.75);
        }
        recorder.finalize(Some("plausible"), 0.9).unwrap();

        let scene = &store.scenes()[0];
        assert!(scene.sealed);
        let steps = scene.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].classification.as_deref(), Some("plausible"));
        assert_eq!(steps[0].confidence, Some(0.75));
        let score = scene.score().unwrap();
        assert_eq!(score.confidence, 0.9);
        assert!(matches!(scene.lines[0], HistoryLine::Scene(_)));
        assert!(matches!(scene.lines.last(), Some(HistoryLine::Score(_))));
    }

    #[test]
    fn sealed_recorder_rejects_further_use() {
        let mut recorder = HistoryRecorder::new(Box::new(NullTarget));
        recorder.finalize(None, 1.0).unwrap();
        assert!(matches!(recorder.open_record(record(1)), Err(HistoryError::Sealed)));
        assert!(matches!(recorder.finalize(None, 1.0), Err(HistoryError::Sealed)));
    }

    #[test]
    fn disabled_recorder_still_tracks_protocol() {
        let mut recorder = HistoryRecorder::disabled();
        recorder.open_record(record(1)).unwrap();
        assert!(recorder.has_open_record());
        recorder.close_and_persist().unwrap();
        recorder.finalize(None, 1.0).unwrap();
    }

    #[test]
    fn jsonl_store_writes_tagged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlHistoryStore::new(dir.path());
        let h = header("group/scene_01");
        let path = store.path_for(&h);
        let mut recorder = HistoryRecorder::new(store.open_target(&h).unwrap());
        recorder.open_record(record(1)).unwrap();
        recorder.close_and_persist().unwrap();
        recorder.put_artifact("heatmap_scene_01_1", &[1, 2, 3]).unwrap();
        recorder.finalize(None, 1.0).unwrap();

        assert!(path.ends_with("group/scene_01-1700000000.jsonl"));
        let text = fs::read_to_string(&path).unwrap();
        let kinds: Vec<String> = text
            .lines()
            .map(|l| {
                let v: JsonValue = serde_json::from_str(l).unwrap();
                v["kind"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(kinds, vec!["scene", "step", "score"]);
        assert_eq!(
            fs::read(path.parent().unwrap().join("heatmap_scene_01_1")).unwrap(),
            vec![1, 2, 3]
        );

        let step: HistoryLine = serde_json::from_str(text.lines().nth(1).unwrap()).unwrap();
        match step {
            HistoryLine::Step(rec) => assert_eq!(rec.step, 1),
            other => panic!("unexpected line {other:?}"),
        }
        let header_line: JsonValue = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(header_line["team"], json!("team"));
        assert_eq!(header_line["metadata_tier"], json!("level2"));
    }

    #[test]
    fn jsonl_store_never_reopens_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlHistoryStore::new(dir.path());
        let h = header("dup");
        for _ in 0..3 {
            let mut recorder = HistoryRecorder::new(store.open_target(&h).unwrap());
            recorder.open_record(record(1)).unwrap();
            recorder.finalize(None, 1.0).unwrap();
        }

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "dup-1700000000-1.jsonl",
                "dup-1700000000-2.jsonl",
                "dup-1700000000.jsonl",
            ]
        );
        for name in names {
            let text = fs::read_to_string(dir.path().join(name)).unwrap();
            assert_eq!(text.lines().count(), 3);
        }
    }

    #[test]
    fn jsonl_artifacts_may_name_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlHistoryStore::new(dir.path());
        let mut target = store.open_target(&header("s")).unwrap();
        target.put_artifact("maps/heatmap_s_1", &[9]).unwrap();
        assert_eq!(fs::read(dir.path().join("maps").join("heatmap_s_1")).unwrap(), vec![9]);
    }

    #[test]
    fn jsonl_target_refuses_writes_after_seal() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlHistoryStore::new(dir.path());
        let mut target = store.open_target(&header("s")).unwrap();
        target.seal().unwrap();
        assert!(matches!(
            target.append(&HistoryLine::Step(record(1))),
            Err(HistoryError::Sealed)
        ));
    }
}
