//! Hand a finished thumbnail to a remote endpoint.
//!
//! An [`UploadSession`] belongs to one form. Each completed pipeline run
//! arms it with a fresh submit handler ([`UploadSession::prepare`]); the
//! next [`UploadSession::submit`] fires that handler exactly once. Without a
//! prepared image, submitting does nothing.
//!
//! The POST is fire-and-forget: it runs as a Tokio task, the response body
//! is never read, and failures are only logged.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::{
    encode::EncodedImage,
    primitive::{anyhow::Context, tracing::instrument, *},
};

/// Multipart field holding the picture.
pub const IMAGE_FIELD: &str = "image";

/// File name sent for the picture.
pub const IMAGE_FILENAME: &str = "image.jpg";

/// Something that can deliver an encoded image.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// POST `image` plus the plain `fields` to `endpoint`.
    async fn post_image(
        &self,
        endpoint: &str,
        fields: &[(String, String)],
        image: EncodedImage,
    ) -> anyhow::Result<()>;
}

/// Multipart POST over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(err, skip(self, fields, image))]
    async fn post_image(
        &self,
        endpoint: &str,
        fields: &[(String, String)],
        image: EncodedImage,
    ) -> anyhow::Result<()> {
        let part = reqwest::multipart::Part::bytes(image.bytes)
            .file_name(IMAGE_FILENAME)
            .mime_str(image.format.mime())
            .context("post_image: bad mime")?;
        let mut form = reqwest::multipart::Form::new();
        for (k, v) in fields {
            form = form.text(k.clone(), v.clone());
        }
        form = form.part(IMAGE_FIELD, part);

        let response = self
            .client
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .context("post_image: send")?;
        // Status only; the body is not our business.
        tracing::debug!("upload answered {}", response.status());
        Ok(())
    }
}

/// The armed submit action.
type SubmitFn = Box<dyn FnOnce() -> JoinHandle<()> + Send>;

/// Per-form upload state.
pub struct UploadSession {
    transport: Arc<dyn Transport>,
    endpoint: String,
    fields: Vec<(String, String)>,
    on_submit: Option<SubmitFn>,
}

impl Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("transport", &self.transport)
            .field("endpoint", &self.endpoint)
            .field("fields", &self.fields)
            .field("armed", &self.on_submit.is_some())
            .finish()
    }
}

impl UploadSession {
    pub fn new(transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            fields: Vec::new(),
            on_submit: None,
        }
    }

    /// Add a plain form field sent along with every upload.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Decide if a submit would send something.
    pub fn is_armed(&self) -> bool {
        self.on_submit.is_some()
    }

    /// Arm the session with the output of a finished run. Replaces any
    /// image prepared earlier but not yet submitted.
    pub fn prepare(&mut self, image: EncodedImage) {
        if self.on_submit.is_some() {
            tracing::debug!("replacing unsent image");
        }
        let transport = Arc::clone(&self.transport);
        let endpoint = self.endpoint.clone();
        let fields = self.fields.clone();
        self.on_submit = Some(Box::new(move || {
            tokio::spawn(async move {
                if let Err(e) = transport.post_image(&endpoint, &fields, image).await {
                    tracing::warn!("upload to {endpoint} failed (ignored): {e:#}");
                }
            })
        }));
    }

    /// Fire the armed upload, if any. Must be called within a Tokio runtime.
    ///
    /// The handle is only for callers that want to wait before exiting.
    pub fn submit(&mut self) -> Option<JoinHandle<()>> {
        match self.on_submit.take() {
            Some(f) => Some(f()),
            None => {
                tracing::trace!("submit with nothing prepared");
                None
            }
        }
    }
}
