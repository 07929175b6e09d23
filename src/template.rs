//! Request body rendering.
//!
//! Templates use Tera syntax and see the fields of a
//! [`FabricatedRecord`](crate::fake_data::FabricatedRecord):
//!
//! ```text
//! {
//!   "firstName": "{{ FirstName }}",
//!   "email": "{{ Email }}",
//!   "moveIn": "{{ MoveInDate | date(format="%Y-%m-%d") }}"
//! }
//! ```
//!
//! The template file is read and parsed on every render, so edits on disk are
//! picked up without a restart.

use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use thiserror::Error;

use crate::fake_data::FabricatedRecord;

/// Errors that can occur when rendering a request body.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to read template '{path}': {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build template context: {0}")]
    Context(#[source] tera::Error),

    #[error("Failed to render template '{path}': {detail}")]
    Render { path: PathBuf, detail: String },
}

/// Renders body templates against fabricated records.
#[derive(Debug, Clone, Default)]
pub struct PayloadRenderer {
    base_dir: Option<PathBuf>,
}

impl PayloadRenderer {
    /// Resolves template references relative to the working directory.
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Resolves relative template references against `base_dir`.
    pub fn with_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve_path(&self, template_ref: &str) -> PathBuf {
        let path = Path::new(template_ref);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Renders the template named by `template_ref` with `record`.
    ///
    /// An empty reference renders an empty body.
    pub fn render(
        &self,
        template_ref: &str,
        record: &FabricatedRecord,
    ) -> Result<String, RenderError> {
        if template_ref.is_empty() {
            return Ok(String::new());
        }

        let path = self.resolve_path(template_ref);
        let source = fs::read_to_string(&path).map_err(|source| RenderError::TemplateRead {
            path: path.clone(),
            source,
        })?;

        render_str(&source, record).map_err(|e| match e {
            RenderError::Render { detail, .. } => RenderError::Render { path, detail },
            other => other,
        })
    }
}

/// Renders template text directly.
pub fn render_str(source: &str, record: &FabricatedRecord) -> Result<String, RenderError> {
    let context = Context::from_serialize(record).map_err(RenderError::Context)?;
    Tera::one_off(source, &context, false).map_err(|e| RenderError::Render {
        path: PathBuf::new(),
        detail: error_chain(&e),
    })
}

/// Tera nests the useful message (e.g. the missing variable) in its sources.
fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = StdError::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
