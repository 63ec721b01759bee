//! Render Mesh Manager
//!
//! Per-frame collection of draw batches and the active camera from the
//! scene contract, plus the runtime toggles the driver forwards to the
//! forward passes (wireframe, deferred on/off).

use crate::render::scene::{CameraInfo, DrawBatch, RenderScene};

pub struct RenderMeshManager {
    batches: Vec<DrawBatch>,
    camera: Option<CameraInfo>,
    wireframe: bool,
    deferred_enabled: bool,
}

impl RenderMeshManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            batches: Vec::new(),
            camera: None,
            wireframe: false,
            deferred_enabled: true,
        }
    }

    /// Collect batches and camera state from the active scene.
    pub fn tick(&mut self, scene: Option<&dyn RenderScene>) {
        self.batches.clear();
        self.camera = None;
        let Some(scene) = scene else {
            return;
        };
        self.camera = scene.camera();
        scene.collect_draw_batches(&mut self.batches);
        if !self.batches.is_empty() {
            log::debug!("collected {} draw batches", self.batches.len());
        }
    }

    #[must_use]
    pub fn batches(&self) -> &[DrawBatch] {
        &self.batches
    }

    #[must_use]
    pub fn camera(&self) -> Option<&CameraInfo> {
        self.camera.as_ref()
    }

    pub fn set_wireframe(&mut self, enable: bool) {
        self.wireframe = enable;
    }

    #[must_use]
    pub fn wireframe(&self) -> bool {
        self.wireframe
    }

    /// Route deferred-mask materials through the G-buffer path; when
    /// disabled everything draws forward.
    pub fn set_deferred_enabled(&mut self, enable: bool) {
        self.deferred_enabled = enable;
    }

    #[must_use]
    pub fn deferred_enabled(&self) -> bool {
        self.deferred_enabled
    }
}

impl Default for RenderMeshManager {
    fn default() -> Self {
        Self::new()
    }
}
