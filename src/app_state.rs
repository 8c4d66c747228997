use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{oneshot, RwLock};

use crate::{config::AppConfig, pipeline::Pipeline};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Arc<RwLock<Pipeline>>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Estado visible en `/api/status`; `job_id` identifica el último setup lanzado.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub job_id: Option<String>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        pipeline: Pipeline,
        shutdown_sender: oneshot::Sender<()>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            config,
            pipeline: Arc::new(RwLock::new(pipeline)),
            status: Arc::new(Mutex::new(Status {
                is_busy: false,
                message: message.into(),
                job_id: None,
            })),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
        }
    }

    pub fn status(&self) -> Status {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Marca el estado como ocupado si no lo estaba ya; `false` si hay otro trabajo en curso.
    pub fn try_begin(&self, job_id: &str, message: impl Into<String>) -> bool {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if status.is_busy {
            return false;
        }
        status.is_busy = true;
        status.message = message.into();
        status.job_id = Some(job_id.to_string());
        true
    }

    pub fn update_status(&self, f: impl FnOnce(&mut Status)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    /// Dispara el apagado ordenado del servidor (sólo la primera vez).
    pub fn request_shutdown(&self) {
        let sender = self
            .shutdown_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}
