//! Render queue of visible objects, split into groups and solid/transparent

use std::collections::BTreeMap;

use crate::camera::Camera;
use crate::caster::ShadowCaster;
use crate::scene::{ObjectId, SceneGraph};

/// Objects of one render queue group
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderQueueGroup {
    pub id: u8,
    pub solids: Vec<ObjectId>,
    pub transparents: Vec<ObjectId>,
}

/// Visible objects for one camera, ordered by group then id
#[derive(Clone, Debug, Default)]
pub struct RenderQueue {
    groups: BTreeMap<u8, RenderQueueGroup>,
}

impl RenderQueue {
    pub fn build(scene: &SceneGraph, camera: &Camera) -> Self {
        let frustum = camera.frustum_planes();
        let mut groups: BTreeMap<u8, RenderQueueGroup> = BTreeMap::new();

        for (id, object) in scene.objects() {
            if !object.is_visible() || !frustum.is_aabb_visible(&object.world_bounding_box()) {
                continue;
            }
            let group_id = scene.queue_group(id).unwrap_or(crate::scene::RENDER_QUEUE_MAIN);
            let group = groups.entry(group_id).or_insert_with(|| RenderQueueGroup {
                id: group_id,
                ..Default::default()
            });

            let transparent = scene
                .material(object.material_name())
                .map_or(false, |material| material.is_transparent());
            if transparent {
                group.transparents.push(id);
            } else {
                group.solids.push(id);
            }
        }
        Self { groups }
    }

    pub fn groups(&self) -> impl Iterator<Item = &RenderQueueGroup> {
        self.groups.values()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.groups
            .values()
            .map(|group| group.solids.len() + group.transparents.len())
            .sum()
    }
}
