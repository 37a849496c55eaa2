use crate::{ExportError, ExportSink, ExportTarget};
use image::DynamicImage;
use phototag_core::Project;
use std::path::PathBuf;

/// Result of one sink.
#[derive(Debug)]
pub struct SinkOutcome {
    pub target: ExportTarget,
    pub result: Result<PathBuf, ExportError>,
}

/// Per-sink results of one export, in sink order.
#[derive(Debug)]
pub struct ExportReport {
    pub name: String,
    pub outcomes: Vec<SinkOutcome>,
}

impl ExportReport {
    /// An export counts as done when any target took the image.
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.result.is_ok())
    }

    pub fn saved_to(&self) -> Vec<ExportTarget> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.target)
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (ExportTarget, &ExportError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.target, e)))
    }

    /// Combined user-facing message.
    pub fn message(&self) -> String {
        let saved: Vec<&str> = self.saved_to().iter().map(|t| t.label()).collect();
        let failed = self.outcomes.len() - saved.len();

        if self.outcomes.is_empty() {
            "No export targets configured".to_string()
        } else if saved.is_empty() {
            let detail: Vec<String> = self
                .failures()
                .map(|(target, err)| format!("{target}: {err}"))
                .collect();
            format!("Export failed ({})", detail.join("; "))
        } else if failed == 0 {
            format!("Image saved to {}", join_labels(&saved))
        } else {
            format!("Image saved to {} only", join_labels(&saved))
        }
    }

    /// `Err(AllFailed)` when no target succeeded.
    pub fn into_result(self) -> Result<Self, ExportError> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(ExportError::AllFailed(self))
        }
    }
}

fn join_labels(labels: &[&str]) -> String {
    match labels {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// Ordered set of export sinks.
#[derive(Default)]
pub struct Exporter {
    sinks: Vec<Box<dyn ExportSink>>,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl ExportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn targets(&self) -> Vec<ExportTarget> {
        self.sinks.iter().map(|s| s.target()).collect()
    }

    /// Run every sink, in order, regardless of earlier failures.
    pub fn export(&self, image: &DynamicImage, name: &str) -> ExportReport {
        let outcomes = self
            .sinks
            .iter()
            .map(|sink| {
                let result = sink.export(image, name);
                if let Err(err) = &result {
                    tracing::warn!(
                        target_sink = %sink.target(),
                        name,
                        error = %err,
                        "export target failed"
                    );
                }
                SinkOutcome {
                    target: sink.target(),
                    result,
                }
            })
            .collect();

        let report = ExportReport {
            name: name.to_string(),
            outcomes,
        };
        tracing::info!(
            name,
            succeeded = report.succeeded(),
            message = %report.message(),
            "export finished"
        );
        report
    }

    /// Decode a stored project and export it under its name. The project
    /// itself is not modified.
    pub fn export_project(&self, project: &Project) -> Result<ExportReport, ExportError> {
        let image = project.decode_image().map_err(|source| ExportError::Decode {
            name: project.name.clone(),
            source,
        })?;
        Ok(self.export(&image, &project.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentsSink, PhotoLibrarySink};
    use fixtures::sample_project;
    use image::RgbImage;

    struct FailingSink(ExportTarget);

    impl ExportSink for FailingSink {
        fn target(&self) -> ExportTarget {
            self.0
        }

        fn export(&self, _image: &DynamicImage, name: &str) -> Result<PathBuf, ExportError> {
            Err(ExportError::InvalidName(name.to_string()))
        }
    }

    mod fixtures {
        use phototag_core::{Orientation, Project, ProjectId};
        use std::io::Cursor;

        pub fn sample_project(image_bytes: Vec<u8>) -> Project {
            Project {
                id: ProjectId::new(),
                name: "flower-9".into(),
                image_bytes,
                has_face: false,
                orientation: Orientation::Square,
                created_at: Default::default(),
            }
        }

        pub fn png(w: u32, h: u32) -> Vec<u8> {
            let mut out = Cursor::new(Vec::new());
            image::DynamicImage::new_rgb8(w, h)
                .write_to(&mut out, image::ImageFormat::Png)
                .unwrap();
            out.into_inner()
        }
    }

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(4, 4))
    }

    #[test]
    fn test_both_targets_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new()
            .with_sink(PhotoLibrarySink::new(dir.path().join("photos")))
            .with_sink(DocumentsSink::new(dir.path().join("docs")));

        let report = exporter.export(&sample(), "sunset-1");
        assert!(report.succeeded());
        assert_eq!(report.saved_to(), vec![ExportTarget::PhotoLibrary, ExportTarget::Documents]);
        assert_eq!(report.message(), "Image saved to Photos and Documents");
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_partial_success_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new()
            .with_sink(PhotoLibrarySink::new(dir.path()))
            .with_sink(FailingSink(ExportTarget::Documents));

        let report = exporter.export(&sample(), "road-5");
        assert!(report.succeeded());
        assert_eq!(report.message(), "Image saved to Photos only");
        assert_eq!(report.failures().count(), 1);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_later_sinks_run_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new()
            .with_sink(FailingSink(ExportTarget::PhotoLibrary))
            .with_sink(DocumentsSink::new(dir.path()));

        let report = exporter.export(&sample(), "pet-8");
        assert_eq!(report.message(), "Image saved to Documents only");
        assert!(dir.path().join("pet-8.jpg").is_file());
    }

    #[test]
    fn test_all_failed() {
        let exporter = Exporter::new()
            .with_sink(FailingSink(ExportTarget::PhotoLibrary))
            .with_sink(FailingSink(ExportTarget::Documents));

        let report = exporter.export(&sample(), "food-2");
        assert!(!report.succeeded());
        assert!(report.message().starts_with("Export failed (Photos: "));
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, ExportError::AllFailed(_)));
    }

    #[test]
    fn test_no_sinks() {
        let report = Exporter::new().export(&sample(), "x-1");
        assert!(!report.succeeded());
        assert_eq!(report.message(), "No export targets configured");
    }

    #[test]
    fn test_export_project_decodes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new().with_sink(DocumentsSink::new(dir.path()));

        let project = sample_project(fixtures::png(6, 3));
        let before = project.clone();
        let report = exporter.export_project(&project).unwrap();
        assert!(report.succeeded());
        assert!(dir.path().join("flower-9.jpg").is_file());
        assert_eq!(project, before);

        let broken = sample_project(b"nope".to_vec());
        assert!(matches!(exporter.export_project(&broken), Err(ExportError::Decode { .. })));
    }

    #[test]
    fn test_join_labels() {
        assert_eq!(join_labels(&["A"]), "A");
        assert_eq!(join_labels(&["A", "B"]), "A and B");
        assert_eq!(join_labels(&["A", "B", "C"]), "A, B and C");
    }
}
