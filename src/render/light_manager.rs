//! Render Light Manager
//!
//! Per-frame collection of the directional light and point lights from
//! the scene contract. Point-light shadow slots are handed out in
//! collection order up to `MAX_POINT_SHADOW_COUNT`; lights beyond
//! `MAX_POINT_LIGHT_COUNT` are dropped with a log.

use crate::render::scene::{DirectionalLightInfo, PointLightInfo, RenderScene};
use crate::render::{MAX_POINT_LIGHT_COUNT, MAX_POINT_SHADOW_COUNT};

pub struct RenderLightManager {
    directional: Option<DirectionalLightInfo>,
    point_lights: Vec<PointLightInfo>,
}

impl RenderLightManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            directional: None,
            point_lights: Vec::new(),
        }
    }

    pub fn tick(&mut self, scene: Option<&dyn RenderScene>) {
        self.directional = None;
        self.point_lights.clear();
        let Some(scene) = scene else {
            return;
        };

        self.directional = scene.directional_light().filter(|light| light.enabled);

        let mut shadow_slots = 0u32;
        for mut light in scene.point_lights() {
            if !light.enabled {
                continue;
            }
            if self.point_lights.len() as u32 >= MAX_POINT_LIGHT_COUNT {
                log::warn!(
                    "dropping point lights beyond the {} per-frame limit",
                    MAX_POINT_LIGHT_COUNT
                );
                break;
            }
            light.shadow_index = if light.cast_shadow && shadow_slots < MAX_POINT_SHADOW_COUNT {
                let slot = shadow_slots;
                shadow_slots += 1;
                Some(slot)
            } else {
                None
            };
            self.point_lights.push(light);
        }
    }

    #[must_use]
    pub fn directional_light(&self) -> Option<&DirectionalLightInfo> {
        self.directional.as_ref()
    }

    #[must_use]
    pub fn point_lights(&self) -> &[PointLightInfo] {
        &self.point_lights
    }
}

impl Default for RenderLightManager {
    fn default() -> Self {
        Self::new()
    }
}
