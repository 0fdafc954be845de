use std::path::{Path, PathBuf};

/// The payload of one form part.
#[derive(Debug)]
pub enum PartBody {
    Text(String),
    Bytes(Vec<u8>),
    /// Read from disk by the transport when the transfer runs.
    File(PathBuf),
}

/// One part of a multipart form.
#[derive(Debug)]
pub struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    body: PartBody,
}

impl Part {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn body(&self) -> &PartBody {
        &self.body
    }
}

/// A `multipart/form-data` body under construction.
///
/// Parts can be appended but never removed. The form is move-only: it is
/// handed to a [`Request`](crate::Request) whole, and the transport encodes
/// it when the transfer runs. A form with zero parts is valid and produces
/// an empty body.
#[derive(Debug, Default)]
pub struct MultipartForm {
    parts: Vec<Part>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a plain text field.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parts.push(Part {
            name: name.into(),
            filename: None,
            content_type: None,
            body: PartBody::Text(value.into()),
        });
    }

    pub fn add_field_with_type(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        content_type: impl Into<String>,
    ) {
        self.parts.push(Part {
            name: name.into(),
            filename: None,
            content_type: Some(content_type.into()),
            body: PartBody::Text(value.into()),
        });
    }

    /// Appends an in-memory buffer presented as a file upload.
    pub fn add_buffer(
        &mut self,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
        filename: impl Into<String>,
        content_type: Option<&str>,
    ) {
        self.parts.push(Part {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: content_type.map(str::to_string),
            body: PartBody::Bytes(data.into()),
        });
    }

    /// Appends a file part; the file is streamed from disk at transfer time.
    pub fn add_file(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) {
        let path = path.as_ref();
        self.parts.push(Part {
            name: name.into(),
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            content_type: content_type.map(str::to_string),
            body: PartBody::File(path.to_path_buf()),
        });
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_accumulate_in_order() {
        let mut form = MultipartForm::new();
        form.add_field("kind", "report");
        form.add_buffer("data", b"abc".to_vec(), "data.bin", Some("application/octet-stream"));
        form.add_file("attachment", "/tmp/report.pdf", None);

        assert_eq!(form.len(), 3);
        let names: Vec<_> = form.parts().iter().map(Part::name).collect();
        assert_eq!(names, vec!["kind", "data", "attachment"]);
    }

    #[test]
    fn file_parts_remember_the_file_name() {
        let mut form = MultipartForm::new();
        form.add_file("upload", "/var/data/image.png", Some("image/png"));

        let part = &form.parts()[0];
        assert_eq!(part.filename(), Some("image.png"));
        assert_eq!(part.content_type(), Some("image/png"));
        assert!(matches!(part.body(), PartBody::File(path) if path.ends_with("image.png")));
    }

    #[test]
    fn an_empty_form_is_accepted() {
        let form = MultipartForm::new();
        assert!(form.is_empty());
        assert_eq!(form.parts().len(), 0);
    }
}
