/// Repository service: the single owner of foreground state
///
/// The calling interface talks to the repository only through [`Command`]s.
/// Quick operations run inline and answer with an [`Outcome`]; export,
/// backup, text extraction and import are handed to the [`JobQueue`] and
/// answer with [`Outcome::Scheduled`]. Their results come back later through
/// [`RepositoryService::next_event`].
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::export::{self, ExportReport};
use crate::imaging::ocr::{ocr_sidecar_path, TesseractExtractor, TextExtractor, DEFAULT_LANGUAGE};
use crate::imaging::transform::{load_image, save_image, ImageTransform, PixelTransform, Rect};
use crate::jobs::{JobEvent, JobHandle, JobKind, JobOutput, JobQueue};
use crate::ops::backup::{self, Snapshot};
use crate::ops::import::{self, ImportReport};
use crate::ops::rename::{self, BatchPattern, BatchRenameReport};
use crate::ops::search;
use crate::ops::stats::{self, RepositoryStats};
use crate::state::config::{Config, ConfigStore, CropSettings, ExportFormat};
use crate::state::data::{Entry, EntryKind, MetadataRecord};
use crate::state::metadata::MetadataStore;
use crate::state::tree::RepositoryTree;

/// Where everything lives under one data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub repository: PathBuf,
    pub backups: PathBuf,
    pub config_file: PathBuf,
}

impl Paths {
    pub fn under(data_root: &Path) -> Self {
        Self {
            repository: data_root.join("repository"),
            backups: data_root.join("backup"),
            config_file: data_root.join("config.json"),
        }
    }

    /// The user's data directory:
    /// - Linux: ~/.local/share/mistake-book
    /// - macOS: ~/Library/Application Support/mistake-book
    /// - Windows: %APPDATA%\mistake-book
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join("mistake-book"))
    }
}

/// How a crop rectangle is given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropRegion {
    Pixels(Rect),
    /// Percent of the image size; remembered in the config
    Percent(CropSettings),
}

/// One request per operation
#[derive(Debug, Clone)]
pub enum Command {
    /// List a directory, or the current one
    List { path: Option<PathBuf> },
    Enter { name: String },
    Up,
    /// Search below the current directory
    Search { term: String },
    Stats,
    Import { subject: String, sources: Vec<PathBuf> },
    Rename { entry: PathBuf, new_name: String },
    BatchRename { entries: Vec<PathBuf>, pattern: BatchPattern },
    Delete { entry: PathBuf },
    Copy { entry: PathBuf, target_dir: PathBuf },
    Move { entry: PathBuf, target_dir: PathBuf },
    SaveMetadata { entry: PathBuf, record: MetadataRecord },
    AddTags { entry: PathBuf, tags: String },
    Enhance { entry: PathBuf, brightness: f32, contrast: f32, sharpness: f32 },
    Crop { entry: PathBuf, region: CropRegion },
    Rotate { entry: PathBuf, degrees: f32 },
    Ocr { entry: PathBuf, language: Option<String> },
    ExportPdf { paths: Vec<PathBuf>, output: PathBuf },
    ExportWord { paths: Vec<PathBuf>, output: PathBuf },
    Backup,
    SetConfig { key: String, value: String },
}

/// Result of a command that finished inline, or the handle of a scheduled job
#[derive(Debug)]
pub enum Outcome {
    Listing(Vec<Entry>),
    Navigated(PathBuf),
    SearchResults(Vec<Entry>),
    Stats(RepositoryStats),
    Entry(Entry),
    BatchRenamed(BatchRenameReport),
    Deleted(PathBuf),
    Metadata(MetadataRecord),
    ConfigUpdated,
    Scheduled(JobHandle),
}

pub struct RepositoryService {
    paths: Paths,
    tree: RepositoryTree,
    config: ConfigStore,
    metadata: MetadataStore,
    transform: Arc<dyn ImageTransform>,
    extractor: Arc<dyn TextExtractor>,
    jobs: JobQueue,
}

impl RepositoryService {
    /// Load the config once and open the repository; jobs run on `runtime`
    pub fn open(paths: Paths, runtime: Handle) -> Result<Self> {
        let config = ConfigStore::load(&paths.config_file);
        let tree = RepositoryTree::open(&paths.repository)?;

        let files = stats::compute(tree.root()).total_files;
        tracing::info!(files, "🎨 Repository service initialized with {} files", files);

        Ok(Self {
            paths,
            tree,
            config,
            metadata: MetadataStore::new(),
            transform: Arc::new(PixelTransform),
            extractor: Arc::new(TesseractExtractor::default()),
            jobs: JobQueue::new(runtime),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn ImageTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn config(&self) -> &Config {
        self.config.get()
    }

    pub fn current_dir(&self) -> &Path {
        self.tree.current()
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Subject directories present in the repository
    pub fn subjects(&self) -> Result<Vec<String>> {
        Ok(self
            .tree
            .list(self.tree.root())?
            .into_iter()
            .filter(Entry::is_dir)
            .map(|e| e.name())
            .collect())
    }

    pub fn dispatch(&mut self, command: Command) -> Result<Outcome> {
        tracing::debug!(?command, "dispatch");

        match command {
            Command::List { path } => {
                let dir = path.map(|p| self.tree.resolve(p));
                let dir = dir.as_deref().unwrap_or(self.tree.current());
                Ok(Outcome::Listing(self.tree.list(dir)?))
            }
            Command::Enter { name } => Ok(Outcome::Navigated(self.tree.enter(&name)?.to_path_buf())),
            Command::Up => Ok(Outcome::Navigated(self.tree.up().to_path_buf())),
            Command::Search { term } => Ok(Outcome::SearchResults(
                search::search(self.tree.current(), &term).collect(),
            )),
            Command::Stats => Ok(Outcome::Stats(stats::compute(self.tree.root()))),
            Command::Import { subject, sources } => self.schedule_import(subject, sources).map(Outcome::Scheduled),
            Command::Rename { entry, new_name } => {
                let entry = self.entry(&entry)?;
                Ok(Outcome::Entry(rename::rename(&entry, &new_name)?))
            }
            Command::BatchRename { entries, pattern } => {
                let entries = entries
                    .iter()
                    .map(|p| self.entry(p))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Outcome::BatchRenamed(rename::batch_rename(&entries, &pattern)))
            }
            Command::Delete { entry } => {
                let entry = self.entry(&entry)?;
                self.tree.delete(&entry)?;
                Ok(Outcome::Deleted(entry.path))
            }
            Command::Copy { entry, target_dir } => {
                let entry = self.entry(&entry)?;
                let target = self.tree.resolve(target_dir);
                Ok(Outcome::Entry(self.tree.copy(&entry, &target)?))
            }
            Command::Move { entry, target_dir } => {
                let entry = self.entry(&entry)?;
                let target = self.tree.resolve(target_dir);
                Ok(Outcome::Entry(self.tree.move_to(&entry, &target)?))
            }
            Command::SaveMetadata { entry, record } => {
                let entry = self.entry(&entry)?;
                Ok(Outcome::Metadata(self.metadata.save(&entry, record)?))
            }
            Command::AddTags { entry, tags } => {
                let entry = self.entry(&entry)?;
                Ok(Outcome::Metadata(self.metadata.add_tags(&entry, &tags)?))
            }
            Command::Enhance {
                entry,
                brightness,
                contrast,
                sharpness,
            } => {
                let transform = Arc::clone(&self.transform);
                self.edit_image(&entry, |img| Ok(transform.adjust(img, brightness, contrast, sharpness)))
                    .map(Outcome::Entry)
            }
            Command::Crop { entry, region } => self.crop(&entry, region).map(Outcome::Entry),
            Command::Rotate { entry, degrees } => {
                let transform = Arc::clone(&self.transform);
                let edited = self.edit_image(&entry, |img| transform.rotate(img, degrees))?;
                self.config.set_image_rotation(degrees.round() as i32)?;
                Ok(Outcome::Entry(edited))
            }
            Command::Ocr { entry, language } => self.schedule_ocr(&entry, language).map(Outcome::Scheduled),
            Command::ExportPdf { paths, output } => {
                Ok(Outcome::Scheduled(self.schedule_export(paths, output, ExportFormat::Pdf)))
            }
            Command::ExportWord { paths, output } => {
                Ok(Outcome::Scheduled(self.schedule_export(paths, output, ExportFormat::Docx)))
            }
            Command::Backup => Ok(Outcome::Scheduled(self.schedule_backup())),
            Command::SetConfig { key, value } => {
                self.config.set(&key, &value)?;
                Ok(Outcome::ConfigUpdated)
            }
        }
    }

    /// Wait for the next background job to finish and apply it
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        let event = self.jobs.next_event().await?;
        self.apply_event(&event);
        Some(event)
    }

    /// Like [`next_event`](Self::next_event) without waiting
    pub fn try_next_event(&mut self) -> Option<JobEvent> {
        let event = self.jobs.try_next_event()?;
        self.apply_event(&event);
        Some(event)
    }

    /// Foreground reaction to a finished job
    fn apply_event(&mut self, event: &JobEvent) {
        if let Ok(JobOutput::Imported { subject, report }) = &event.outcome {
            if report.imported_count() > 0 {
                self.tree.jump_to_subject(subject);
            }
        }
    }

    /// Synchronous import into `subject`, also remembered as the last subject
    pub fn import_files(&mut self, subject: &str, sources: &[PathBuf]) -> Result<ImportReport> {
        self.config.set_last_subject(subject)?;
        let report = import::import_files(&self.paths.repository, subject, sources)?;
        if report.imported_count() > 0 {
            self.tree.jump_to_subject(subject);
        }
        Ok(report)
    }

    /// Synchronous export (the commands run the same thing as a job)
    pub fn export(&self, paths: &[PathBuf], output: &Path, format: ExportFormat) -> Result<ExportReport> {
        let paths: Vec<PathBuf> = paths.iter().map(|p| self.tree.resolve(p)).collect();
        export::export(&paths, output, format)
    }

    /// Synchronous snapshot
    pub fn backup(&self) -> Result<Snapshot> {
        backup::snapshot(&self.paths.repository, &self.paths.backups)
    }

    fn schedule_import(&mut self, subject: String, sources: Vec<PathBuf>) -> Result<JobHandle> {
        self.config.set_last_subject(&subject)?;
        let root = self.paths.repository.clone();

        Ok(self.jobs.spawn(JobKind::Import, move || {
            let report = import::import_files(&root, &subject, &sources)?;
            Ok(JobOutput::Imported { subject, report })
        }))
    }

    fn schedule_export(&mut self, paths: Vec<PathBuf>, output: PathBuf, format: ExportFormat) -> JobHandle {
        let paths: Vec<PathBuf> = paths.into_iter().map(|p| self.tree.resolve(p)).collect();

        self.jobs.spawn(JobKind::Export, move || {
            export::export(&paths, &output, format).map(JobOutput::Exported)
        })
    }

    fn schedule_backup(&mut self) -> JobHandle {
        let repository = self.paths.repository.clone();
        let backups = self.paths.backups.clone();

        self.jobs.spawn(JobKind::Backup, move || {
            backup::snapshot(&repository, &backups).map(JobOutput::BackedUp)
        })
    }

    fn schedule_ocr(&mut self, entry: &Path, language: Option<String>) -> Result<JobHandle> {
        if !self.config.get().ocr_enabled {
            return Err(Error::RecognitionFailure("text extraction is disabled in the settings".into()));
        }
        let entry = self.image_entry(entry)?;
        let extractor = Arc::clone(&self.extractor);
        let language = language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        Ok(self.jobs.spawn(JobKind::TextExtraction, move || {
            let text = extractor.extract(&entry.path, &language)?;
            let sidecar = ocr_sidecar_path(&entry.path);
            fs::write(&sidecar, &text).map_err(|e| Error::io("save extracted text", &sidecar, e))?;
            Ok(JobOutput::TextExtracted { text, sidecar })
        }))
    }

    fn crop(&mut self, entry: &Path, region: CropRegion) -> Result<Entry> {
        let transform = Arc::clone(&self.transform);
        let edited = self.edit_image(entry, |img| {
            let rect = match region {
                CropRegion::Pixels(rect) => rect,
                CropRegion::Percent(settings) => Rect::from_percent(&settings, img.width(), img.height()),
            };
            transform.crop(img, rect)
        })?;

        if let CropRegion::Percent(settings) = region {
            self.config.set_crop_settings(settings)?;
        }
        Ok(edited)
    }

    /// Load, transform and write an image back in place.
    ///
    /// With `auto_backup` on, the original is first copied to
    /// `<file>.backup` unless such a copy already exists.
    fn edit_image(
        &self,
        entry: &Path,
        apply: impl FnOnce(&DynamicImage) -> Result<DynamicImage>,
    ) -> Result<Entry> {
        let entry = self.image_entry(entry)?;
        let original = load_image(&entry.path)?;
        let edited = apply(&original)?;

        let config = self.config.get();
        if config.auto_backup {
            let mut backup_name = entry.path.clone().into_os_string();
            backup_name.push(".backup");
            let backup_path = PathBuf::from(backup_name);
            if !backup_path.exists() {
                fs::copy(&entry.path, &backup_path).map_err(|e| Error::io("backup image", &backup_path, e))?;
            }
        }

        save_image(&edited, &entry.path, config.image_quality)?;
        tracing::info!(path = %entry.path.display(), "🖼️  Image updated");
        Entry::from_path(entry.path)
    }

    fn entry(&self, path: &Path) -> Result<Entry> {
        Entry::from_path(self.tree.resolve(path))
    }

    fn image_entry(&self, path: &Path) -> Result<Entry> {
        let entry = self.entry(path)?;
        if entry.kind != EntryKind::Image {
            return Err(Error::Unsupported(format!("{} is not an image", entry.path.display())));
        }
        Ok(entry)
    }
}

impl std::fmt::Debug for RepositoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryService")
            .field("paths", &self.paths)
            .field("current", &self.tree.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::{tempdir, TempDir};

    struct FakeExtractor;

    impl TextExtractor for FakeExtractor {
        fn extract(&self, image: &Path, language: &str) -> Result<String> {
            Ok(format!("{} [{language}]\nx^2 = 4", image.display()))
        }
    }

    fn write_jpeg(path: &Path, w: u32, h: u32) {
        DynamicImage::ImageRgb8(RgbImage::new(w, h)).save(path).unwrap();
    }

    /// `/R/Math/{q1.jpg, q2.jpg}` with a `{tags: "hard"}` sidecar on q2
    fn scenario() -> (TempDir, RepositoryService) {
        let dir = tempdir().unwrap();
        let paths = Paths::under(dir.path());
        let math = paths.repository.join("Math");
        fs::create_dir_all(&math).unwrap();
        write_jpeg(&math.join("q1.jpg"), 30, 40);
        write_jpeg(&math.join("q2.jpg"), 40, 30);
        fs::write(math.join("q2.meta"), r#"{"tags": "hard"}"#).unwrap();

        let service = RepositoryService::open(paths, Handle::current())
            .unwrap()
            .with_extractor(Arc::new(FakeExtractor));
        (dir, service)
    }

    #[tokio::test]
    async fn test_search_finds_single_match() {
        let (_dir, mut service) = scenario();
        let Outcome::SearchResults(found) = service.dispatch(Command::Search { term: "q1".into() }).unwrap() else {
            panic!("expected search results");
        };
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("Math/q1.jpg"));
    }

    #[tokio::test]
    async fn test_stats_count_files_by_subject() {
        let (_dir, mut service) = scenario();
        let Outcome::Stats(stats) = service.dispatch(Command::Stats).unwrap() else {
            panic!("expected stats");
        };
        // the two images plus q2.meta
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.by_subject.get("Math"), Some(&3));
    }

    #[tokio::test]
    async fn test_export_subject_yields_two_image_pages_in_order() {
        let (dir, mut service) = scenario();
        let output = dir.path().join("math.pdf");

        let Outcome::Scheduled(handle) = service
            .dispatch(Command::ExportPdf {
                paths: vec![PathBuf::from("Math")],
                output: output.clone(),
            })
            .unwrap()
        else {
            panic!("export should be scheduled");
        };

        let event = service.next_event().await.unwrap();
        assert_eq!(event.id, handle.id);
        let Ok(JobOutput::Exported(report)) = event.outcome else {
            panic!("export failed: {:?}", event.outcome);
        };
        assert_eq!(report.pages, 2);
        assert_eq!(report.attachments, 0);

        let doc: serde_json::Value = serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
        let pages = doc["document"]["pages"].as_array().unwrap();
        assert_eq!(pages[0]["items"][0]["text"], "q1.jpg");
        assert_eq!(pages[1]["items"][0]["text"], "q2.jpg");
    }

    #[tokio::test]
    async fn test_rename_conflict_changes_nothing() {
        let (_dir, mut service) = scenario();
        service.dispatch(Command::Enter { name: "Math".into() }).unwrap();

        let err = service
            .dispatch(Command::Rename {
                entry: "q1.jpg".into(),
                new_name: "q2.jpg".into(),
            })
            .unwrap_err();
        assert!(err.is_conflict());

        let Outcome::Listing(entries) = service.dispatch(Command::List { path: None }).unwrap() else {
            panic!("expected listing");
        };
        let names: Vec<String> = entries.iter().map(Entry::name).collect();
        assert_eq!(names, vec!["q1.jpg", "q2.jpg", "q2.meta"]);
    }

    #[tokio::test]
    async fn test_add_tags_keeps_existing_tags() {
        let (_dir, mut service) = scenario();
        let Outcome::Metadata(record) = service
            .dispatch(Command::AddTags {
                entry: "Math/q2.jpg".into(),
                tags: "easy".into(),
            })
            .unwrap()
        else {
            panic!("expected metadata");
        };
        assert_eq!(record.tags(), "hard");

        let Outcome::Metadata(fresh) = service
            .dispatch(Command::AddTags {
                entry: "Math/q1.jpg".into(),
                tags: "algebra, algebra".into(),
            })
            .unwrap()
        else {
            panic!("expected metadata");
        };
        assert_eq!(fresh.tags(), "algebra, algebra");
    }

    #[tokio::test]
    async fn test_crop_writes_backup_once() {
        let (dir, mut service) = scenario();
        let q1 = dir.path().join("repository/Math/q1.jpg");
        let original = fs::read(&q1).unwrap();

        service
            .dispatch(Command::Crop {
                entry: q1.clone(),
                region: CropRegion::Pixels(Rect { left: 0, top: 0, right: 10, bottom: 10 }),
            })
            .unwrap();
        service
            .dispatch(Command::Rotate {
                entry: q1.clone(),
                degrees: 90.0,
            })
            .unwrap();

        let backup = dir.path().join("repository/Math/q1.jpg.backup");
        assert_eq!(fs::read(backup).unwrap(), original);
        assert_eq!(image::image_dimensions(&q1).unwrap(), (10, 10));
        assert_eq!(service.config().image_rotation, 90);
    }

    #[tokio::test]
    async fn test_percent_crop_is_remembered() {
        let (dir, mut service) = scenario();
        let settings = CropSettings { left: 0, top: 50, right: 100, bottom: 100 };

        service
            .dispatch(Command::Crop {
                entry: dir.path().join("repository/Math/q1.jpg"),
                region: CropRegion::Percent(settings),
            })
            .unwrap();

        assert_eq!(service.config().crop_settings, settings);
        let reloaded = ConfigStore::load(dir.path().join("config.json"));
        assert_eq!(reloaded.get().crop_settings, settings);
    }

    #[tokio::test]
    async fn test_bad_crop_is_invalid_region_and_file_untouched() {
        let (dir, mut service) = scenario();
        let q1 = dir.path().join("repository/Math/q1.jpg");
        let before = fs::read(&q1).unwrap();

        let err = service
            .dispatch(Command::Crop {
                entry: q1.clone(),
                region: CropRegion::Pixels(Rect { left: 20, top: 0, right: 10, bottom: 10 }),
            })
            .unwrap_err();

        assert!(matches!(err, Error::InvalidRegion(_)));
        assert_eq!(fs::read(&q1).unwrap(), before);
    }

    #[tokio::test]
    async fn test_ocr_sidecar_is_attached_on_export() {
        let (dir, mut service) = scenario();
        service
            .dispatch(Command::Ocr {
                entry: "Math/q1.jpg".into(),
                language: None,
            })
            .unwrap();
        let event = service.next_event().await.unwrap();
        assert!(matches!(event.outcome, Ok(JobOutput::TextExtracted { .. })));
        assert!(dir.path().join("repository/Math/q1_ocr.txt").is_file());

        let report = service
            .export(&[PathBuf::from("Math")], &dir.path().join("out.docx"), ExportFormat::Docx)
            .unwrap();
        assert_eq!(report.attachments, 1);
        // q1 image, q1 text, q1_ocr.txt as a text entry, q2 image
        assert_eq!(report.texts, 1);
        assert_eq!(report.pages, 4);
    }

    #[tokio::test]
    async fn test_ocr_disabled_is_refused() {
        let (_dir, mut service) = scenario();
        service
            .dispatch(Command::SetConfig {
                key: "ocr_enabled".into(),
                value: "false".into(),
            })
            .unwrap();

        let err = service
            .dispatch(Command::Ocr {
                entry: "Math/q1.jpg".into(),
                language: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::RecognitionFailure(_)));
    }

    #[tokio::test]
    async fn test_import_job_updates_subject_and_navigation() {
        let (dir, mut service) = scenario();
        let source = dir.path().join("q1.jpg");
        write_jpeg(&source, 5, 5);

        service
            .dispatch(Command::Import {
                subject: "Math".into(),
                sources: vec![source],
            })
            .unwrap();
        let event = service.next_event().await.unwrap();

        let Ok(JobOutput::Imported { report, .. }) = event.outcome else {
            panic!("import failed");
        };
        assert!(report.imported[0].ends_with("Math/q1_1.jpg"));
        assert_eq!(service.config().last_subject, "Math");
        assert!(service.current_dir().ends_with("Math"));
    }

    #[tokio::test]
    async fn test_backup_job_reports_snapshot() {
        let (dir, mut service) = scenario();
        service.dispatch(Command::Backup).unwrap();

        let event = service.next_event().await.unwrap();
        let Ok(JobOutput::BackedUp(snapshot)) = event.outcome else {
            panic!("backup failed");
        };
        assert!(snapshot.path.starts_with(dir.path().join("backup")));
        assert!(snapshot.path.join("Math/q2.meta").is_file());
    }

    #[tokio::test]
    async fn test_subjects_and_non_image_edits() {
        let (_dir, mut service) = scenario();
        assert_eq!(service.subjects().unwrap(), vec!["Math"]);

        let err = service
            .dispatch(Command::Rotate {
                entry: "Math/q2.meta".into(),
                degrees: 90.0,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
