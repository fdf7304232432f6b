//! Always-above region
//!
//! A floating container at the front of an output's workspace layer. Views
//! tagged `KEPT_ABOVE` live in it instead of the regular view container.

use log::{debug, warn};

use super::ActionError;
use crate::output::{Layer, OutputId};
use crate::scene::NodeId;
use crate::shell::Shell;
use crate::window::{ViewId, ViewTags};

#[derive(Debug)]
pub(super) struct AboveRegion {
    node: NodeId,
}

impl AboveRegion {
    /// Create the region in front of everything in the workspace layer of
    /// `output`.
    pub fn create(shell: &mut Shell, output: OutputId) -> Result<Self, ActionError> {
        let layer = shell
            .output(output)
            .map(|o| o.node_for_layer(Layer::Workspace))
            .ok_or(ActionError::UnknownOutput(output))?;

        let node = shell.scene_mut().create_floating();
        shell.scene_mut().add_front(layer, node)?;
        debug!("Created always-above region {} on {}", node, output);
        Ok(Self { node })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Whether the node of `view` is a direct child of the region.
    pub fn contains(&self, shell: &Shell, view: ViewId) -> bool {
        shell
            .view(view)
            .is_some_and(|v| shell.scene().parent(v.node) == Some(self.node))
    }

    /// Detach `view` from wherever it is and put it at the top of the region.
    pub fn insert(&self, shell: &mut Shell, view: ViewId) -> Result<(), ActionError> {
        let node = shell.view(view).map(|v| v.node).ok_or(ActionError::UnknownView(view))?;
        shell.scene_mut().add_front(self.node, node)?;
        Ok(())
    }

    /// Put `view` back at the top of its output's workspace layer. Unmapped
    /// views are only detached.
    pub fn restore(shell: &mut Shell, view: ViewId) -> Result<(), ActionError> {
        let (node, output, mapped) = shell
            .view(view)
            .map(|v| (v.node, v.output, v.mapped))
            .ok_or(ActionError::UnknownView(view))?;
        if !mapped {
            shell.scene_mut().remove_child(node);
            return Ok(());
        }

        let container = shell
            .output(output)
            .map(|o| o.view_container(Layer::Workspace))
            .ok_or(ActionError::UnknownOutput(output))?;

        shell.scene_mut().add_front(container, node)?;
        Ok(())
    }

    /// Move a tagged, mapped view back into the region if the host relocated
    /// it. Untagged views are left alone.
    pub fn reassert(&self, shell: &mut Shell, view: ViewId) -> bool {
        let tagged_and_mapped = shell
            .view(view)
            .is_some_and(|v| v.mapped && v.has_tag(ViewTags::KEPT_ABOVE));
        if !tagged_and_mapped || self.contains(shell, view) {
            return false;
        }

        match self.insert(shell, view) {
            Ok(()) => {
                debug!("Re-asserted {} in always-above region", view);
                true
            }
            Err(err) => {
                warn!("Failed to re-assert {} above: {}", view, err);
                false
            }
        }
    }

    /// Check that every mapped `KEPT_ABOVE` view of `output` sits in the
    /// region, re-inserting the ones that do not. Returns how many were
    /// repaired.
    pub fn audit(&self, shell: &mut Shell, output: OutputId) -> usize {
        let strays: Vec<ViewId> = shell
            .views()
            .iter()
            .filter(|v| v.output == output && v.mapped && v.has_tag(ViewTags::KEPT_ABOVE))
            .map(|v| v.id)
            .filter(|id| !self.contains(shell, *id))
            .collect();

        debug_assert!(strays.is_empty(), "tagged kept-above but outside the region: {:?}", strays);
        for view in &strays {
            warn!("⚠️ {} is tagged kept-above but outside the region, re-inserting", view);
            if let Err(err) = self.insert(shell, *view) {
                warn!("Failed to re-insert {}: {}", view, err);
            }
        }
        strays.len()
    }

    /// Remove the region from the scene. Returns nodes that were still inside.
    pub fn destroy(self, shell: &mut Shell) -> Vec<NodeId> {
        debug!("Destroying always-above region {}", self.node);
        shell.scene_mut().destroy(self.node)
    }
}
