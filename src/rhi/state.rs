//! Resource-State Tracking
//!
//! Shared between backends: the transition validity table and a
//! per-subresource state tracker. Barriers are validated here so that
//! contract violations surface identically on every backend, including
//! ones (like wgpu) whose native API performs its own hazard tracking.

use parking_lot::Mutex;

use super::types::{ResourceState, SubresourceRange};

/// Whether `old -> new` is a legal transition.
///
/// `Undefined` may transition to anything (first use); nothing may
/// transition *to* `Undefined`. All other states are mutually reachable;
/// the table exists to catch nonsensical requests early rather than to
/// model a specific API's pairwise rules.
#[must_use]
pub fn is_valid_transition(_old: ResourceState, new: ResourceState) -> bool {
    new != ResourceState::Undefined
}

/// The state an attachment or read dependency requires.
///
/// Used by the RDG executor to derive barrier targets from usage.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TextureUsageKind {
    ColorTarget,
    DepthWrite,
    DepthRead,
    Sampled,
    CopySrc,
    CopyDst,
    Present,
}

impl TextureUsageKind {
    #[must_use]
    pub fn required_state(self) -> ResourceState {
        match self {
            Self::ColorTarget => ResourceState::RenderTarget,
            Self::DepthWrite => ResourceState::DepthWrite,
            Self::DepthRead => ResourceState::DepthRead,
            Self::Sampled => ResourceState::ShaderResource,
            Self::CopySrc => ResourceState::CopySrc,
            Self::CopyDst => ResourceState::CopyDst,
            Self::Present => ResourceState::Present,
        }
    }
}

/// Per-subresource state storage for one texture.
///
/// Subresources are addressed as `layer * mip_levels + mip`. The common
/// case (every subresource in the same state) stays on a fast path.
pub struct SubresourceStates {
    mip_levels: u32,
    array_layers: u32,
    states: Mutex<Vec<ResourceState>>,
}

impl SubresourceStates {
    #[must_use]
    pub fn new(mip_levels: u32, array_layers: u32, initial: ResourceState) -> Self {
        let count = (mip_levels.max(1) * array_layers.max(1)) as usize;
        Self {
            mip_levels: mip_levels.max(1),
            array_layers: array_layers.max(1),
            states: Mutex::new(vec![initial; count]),
        }
    }

    /// The state shared by every subresource in `range`, or `None` when
    /// the range is in mixed states.
    #[must_use]
    pub fn uniform_state(&self, range: &SubresourceRange) -> Option<ResourceState> {
        let range = range.resolve(self.mip_levels, self.array_layers);
        let states = self.states.lock();
        let mut result = None;
        for layer in range.base_layer..range.base_layer + range.layer_count {
            for mip in range.base_mip..range.base_mip + range.mip_count {
                let idx = (layer * self.mip_levels + mip) as usize;
                let Some(&state) = states.get(idx) else {
                    return None;
                };
                match result {
                    None => result = Some(state),
                    Some(prev) if prev != state => return None,
                    Some(_) => {}
                }
            }
        }
        result
    }

    /// Set every subresource in `range` to `state`.
    pub fn set(&self, range: &SubresourceRange, state: ResourceState) {
        let range = range.resolve(self.mip_levels, self.array_layers);
        let mut states = self.states.lock();
        for layer in range.base_layer..range.base_layer + range.layer_count {
            for mip in range.base_mip..range.base_mip + range.mip_count {
                let idx = (layer * self.mip_levels + mip) as usize;
                if let Some(slot) = states.get_mut(idx) {
                    *slot = state;
                }
            }
        }
    }

    /// The state of the whole texture, when uniform.
    #[must_use]
    pub fn whole_state(&self) -> Option<ResourceState> {
        let states = self.states.lock();
        let first = *states.first()?;
        states.iter().all(|&s| s == first).then_some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::types::TextureAspect;

    #[test]
    fn undefined_is_never_a_destination() {
        assert!(!is_valid_transition(
            ResourceState::Common,
            ResourceState::Undefined
        ));
        assert!(is_valid_transition(
            ResourceState::Undefined,
            ResourceState::CopyDst
        ));
    }

    #[test]
    fn subresource_states_track_ranges() {
        let states = SubresourceStates::new(4, 1, ResourceState::Undefined);
        let lower = SubresourceRange {
            aspect: TextureAspect::Color,
            base_mip: 0,
            mip_count: 2,
            base_layer: 0,
            layer_count: 1,
        };
        states.set(&lower, ResourceState::ShaderResource);

        assert_eq!(
            states.uniform_state(&lower),
            Some(ResourceState::ShaderResource)
        );
        // Whole texture is now mixed
        assert_eq!(
            states.uniform_state(&SubresourceRange::all(TextureAspect::Color)),
            None
        );
    }
}
