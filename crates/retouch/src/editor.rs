use tokio::sync::mpsc;

use crate::{
    error::{Result, RetouchError},
    harness::{Completion, Harness, HarnessConfig, SessionHandle, Ticket},
    history::HistoryView,
    types::{Image, ParameterBag, SessionId, SharedImage},
};

/// Single-document front end over a [`Harness`].
///
/// Everything except [`Editor::init_session`] fails with
/// [`RetouchError::IllegalState`] until an initial image has been supplied.
pub struct Editor {
    harness: Harness,
    session: Option<SessionHandle>,
}

impl Editor {
    pub fn new(config: HarnessConfig) -> Result<Self> {
        Ok(Self {
            harness: Harness::new(config)?,
            session: None,
        })
    }

    /// Start editing `image`. Any previous session is abandoned once its
    /// queued work has finished.
    pub fn init_session(&mut self, image: Image) -> SessionId {
        let handle = self.harness.open_session(image);
        let id = handle.id();
        self.session = Some(handle);
        id
    }

    pub fn session(&self) -> Result<&SessionHandle> {
        self.session.as_ref().ok_or_else(|| {
            RetouchError::IllegalState("no image loaded, call init_session first".to_string())
        })
    }

    pub async fn submit_request(&self, tag: &str, params: &ParameterBag) -> Result<Ticket> {
        self.session()?.submit(tag, params).await
    }

    pub async fn undo(&self) -> Result<Option<SharedImage>> {
        self.session()?.undo().await
    }

    pub async fn redo(&self) -> Result<Option<SharedImage>> {
        self.session()?.redo().await
    }

    pub async fn can_undo(&self) -> Result<bool> {
        self.session()?.can_undo().await
    }

    pub async fn can_redo(&self) -> Result<bool> {
        self.session()?.can_redo().await
    }

    pub async fn current_image(&self) -> Result<SharedImage> {
        self.session()?.current_image().await
    }

    pub async fn history(&self) -> Result<HistoryView> {
        self.session()?.history().await
    }

    /// See [`Harness::completions`].
    pub fn completions(&self) -> Result<mpsc::Receiver<Completion>> {
        self.harness.completions()
    }
}
