use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    PlainText,
    Pdf,
    Pptx,
}

/// Course material the indexer knows how to turn into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseFile {
    /// Speech-to-text result serialized as JSON.
    Transcript,
    Slides(SlideFormat),
}

impl CourseFile {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(Self::Transcript),
            "txt" | "md" => Some(Self::Slides(SlideFormat::PlainText)),
            "pdf" => Some(Self::Slides(SlideFormat::Pdf)),
            "pptx" => Some(Self::Slides(SlideFormat::Pptx)),
            _ => None,
        }
    }
}

/// Supported files under `dir`, sorted by path so repeated runs see the same order.
pub fn walk_course_dir(dir: &Path) -> Vec<(PathBuf, CourseFile)> {
    let mut files: Vec<(PathBuf, CourseFile)> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            // Skip hidden directories and files
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.into_path();
            let ext = path.extension()?.to_str()?;
            let kind = CourseFile::from_extension(ext)?;
            Some((path, kind))
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(CourseFile::from_extension("JSON"), Some(CourseFile::Transcript));
        assert_eq!(CourseFile::from_extension("pptx"), Some(CourseFile::Slides(SlideFormat::Pptx)));
        assert_eq!(CourseFile::from_extension("docx"), None);
    }

    #[test]
    fn test_walk_skips_hidden_and_unsupported() {
        let dir = std::env::temp_dir().join(format!("course-rag-walk-{}", std::process::id()));
        std::fs::create_dir_all(dir.join(".cache")).unwrap();
        std::fs::write(dir.join("b_slides.md"), "x").unwrap();
        std::fs::write(dir.join("a_lecture.json"), "{}").unwrap();
        std::fs::write(dir.join("video.mp4"), "").unwrap();
        std::fs::write(dir.join(".cache").join("c.md"), "x").unwrap();

        let files = walk_course_dir(&dir);
        std::fs::remove_dir_all(&dir).ok();

        let names: Vec<String> = files
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["a_lecture.json", "b_slides.md"]);
    }
}
