//! Scene objects, lights and region queries
//!
//! A deliberately small scene: objects live in an ordered map keyed by
//! [`ObjectId`], so every query returns results in a stable order.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use void_math::{Mat4, PlaneBoundedVolume, Sphere, AABB};

use crate::caster::{ShadowCaster, ShadowRenderable, ShadowVolumeRequest};
use crate::entity::Entity;
use crate::error::Result;
use crate::light::Light;
use crate::material::{ColourValue, Material};
use crate::render_system::RenderOperation;
use crate::static_geometry::StaticGeometry;

/// Render queue group for regular scene geometry
pub const RENDER_QUEUE_MAIN: u8 = 50;

/// Handle of an object in a [`SceneGraph`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

/// Anything placed in the scene
#[derive(Debug)]
pub enum SceneObject {
    Entity(Entity),
    StaticGeometry(StaticGeometry),
}

impl SceneObject {
    pub fn name(&self) -> &str {
        match self {
            Self::Entity(entity) => entity.name(),
            Self::StaticGeometry(geometry) => geometry.name(),
        }
    }

    pub fn world_transform(&self) -> Mat4 {
        match self {
            Self::Entity(entity) => *entity.transform(),
            Self::StaticGeometry(_) => Mat4::IDENTITY,
        }
    }

    pub fn render_operations(&self) -> Result<Vec<RenderOperation<'_>>> {
        match self {
            Self::Entity(entity) => entity.render_operations(),
            Self::StaticGeometry(geometry) => Ok(geometry.render_operations()),
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::StaticGeometry(_) => None,
        }
    }

    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::StaticGeometry(_) => None,
        }
    }

    fn caster(&self) -> &dyn ShadowCaster {
        match self {
            Self::Entity(entity) => entity,
            Self::StaticGeometry(geometry) => geometry,
        }
    }

    fn caster_mut(&mut self) -> &mut dyn ShadowCaster {
        match self {
            Self::Entity(entity) => entity,
            Self::StaticGeometry(geometry) => geometry,
        }
    }
}

impl From<Entity> for SceneObject {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<StaticGeometry> for SceneObject {
    fn from(geometry: StaticGeometry) -> Self {
        Self::StaticGeometry(geometry)
    }
}

impl ShadowCaster for SceneObject {
    fn casts_shadows(&self) -> bool {
        self.caster().casts_shadows()
    }

    fn is_visible(&self) -> bool {
        self.caster().is_visible()
    }

    fn material_name(&self) -> &str {
        self.caster().material_name()
    }

    fn world_bounding_box(&self) -> AABB {
        self.caster().world_bounding_box()
    }

    fn world_bounding_sphere(&self) -> Sphere {
        self.caster().world_bounding_sphere()
    }

    fn light_cap_bounds(&self) -> AABB {
        self.caster().light_cap_bounds()
    }

    fn dark_cap_bounds(&self, light: &Light, extrusion_distance: f32) -> AABB {
        self.caster().dark_cap_bounds(light, extrusion_distance)
    }

    fn point_extrusion_distance(&self, light: &Light) -> f32 {
        self.caster().point_extrusion_distance(light)
    }

    fn shadow_renderables(&mut self, request: &ShadowVolumeRequest<'_>) -> Result<Vec<ShadowRenderable>> {
        self.caster_mut().shadow_renderables(request)
    }
}

#[derive(Debug)]
struct SceneNode {
    object: SceneObject,
    queue_group: u8,
}

/// Objects, lights and materials of a scene
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: BTreeMap<ObjectId, SceneNode>,
    lights: Vec<Light>,
    materials: HashMap<String, Material>,
    ambient: ColourValue,
    next_id: u32,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            ambient: ColourValue::new(0.2, 0.2, 0.2, 1.0),
            ..Default::default()
        }
    }

    pub fn add_object(&mut self, object: impl Into<SceneObject>) -> ObjectId {
        self.add_object_to_group(object, RENDER_QUEUE_MAIN)
    }

    pub fn add_object_to_group(&mut self, object: impl Into<SceneObject>, queue_group: u8) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            SceneNode {
                object: object.into(),
                queue_group,
            },
        );
        id
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Option<SceneObject> {
        self.nodes.remove(&id).map(|node| node.object)
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.nodes.get(&id).map(|node| &node.object)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.nodes.get_mut(&id).map(|node| &mut node.object)
    }

    pub fn queue_group(&self, id: ObjectId) -> Option<u8> {
        self.nodes.get(&id).map(|node| node.queue_group)
    }

    /// Objects in id order
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &SceneObject)> {
        self.nodes.iter().map(|(id, node)| (*id, &node.object))
    }

    pub fn object_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn light_mut(&mut self, index: usize) -> Option<&mut Light> {
        self.lights.get_mut(index)
    }

    /// Lights able to reach an object
    pub fn lights_affecting(&self, id: ObjectId) -> Vec<&Light> {
        let Some(object) = self.object(id) else {
            return Vec::new();
        };
        let sphere = object.world_bounding_sphere();
        self.lights.iter().filter(|light| light.affects_sphere(&sphere)).collect()
    }

    pub fn ambient_light(&self) -> ColourValue {
        self.ambient
    }

    pub fn set_ambient_light(&mut self, colour: ColourValue) {
        self.ambient = colour;
    }

    pub fn add_material(&mut self, material: Material) {
        self.materials.insert(material.name.clone(), material);
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    /// Objects whose world bounds intersect `aabb`
    pub fn query_aabb(&self, aabb: &AABB) -> Vec<ObjectId> {
        self.query(|object| aabb.intersects(&object.world_bounding_box()))
    }

    /// Objects whose world bounds intersect `sphere`
    pub fn query_sphere(&self, sphere: &Sphere) -> Vec<ObjectId> {
        self.query(|object| sphere.intersects_aabb(&object.world_bounding_box()))
    }

    /// Objects whose world bounds intersect `volume`
    pub fn query_volume(&self, volume: &PlaneBoundedVolume) -> Vec<ObjectId> {
        self.query(|object| volume.intersects_aabb(&object.world_bounding_box()))
    }

    fn query(&self, mut filter: impl FnMut(&SceneObject) -> bool) -> Vec<ObjectId> {
        self.nodes
            .iter()
            .filter(|(_, node)| filter(&node.object))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Union of the bounds of visible objects
    pub fn visible_bounds(&self) -> AABB {
        self.nodes
            .values()
            .filter(|node| node.object.is_visible())
            .fold(AABB::EMPTY, |acc, node| acc.union(&node.object.world_bounding_box()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use std::sync::Arc;
    use void_math::Vec3;

    fn scene() -> (SceneGraph, ObjectId, ObjectId) {
        let mesh = Arc::new(Mesh::new_box("cube", Vec3::ONE, "stone"));
        let mut scene = SceneGraph::new();
        let near = scene.add_object(Entity::new("near", Arc::clone(&mesh)));
        let far = scene.add_object(
            Entity::new("far", mesh).with_transform(Mat4::from_translation(Vec3::new(100.0, 0.0, 0.0))),
        );
        (scene, near, far)
    }

    #[test]
    fn test_region_queries_in_id_order() {
        let (scene, near, far) = scene();
        assert_eq!(scene.query_aabb(&AABB::new(Vec3::splat(-200.0), Vec3::splat(200.0))), vec![near, far]);
        assert_eq!(scene.query_sphere(&Sphere::new(Vec3::ZERO, 5.0)), vec![near]);
        assert_eq!(scene.query_volume(&PlaneBoundedVolume::default()), vec![near, far]);
    }

    #[test]
    fn test_lights_affecting() {
        let (mut scene, near, far) = scene();
        scene.add_light(Light::point("lamp", Vec3::new(0.0, 5.0, 0.0), 10.0));
        scene.add_light(Light::directional("sun", Vec3::NEG_Y));
        assert_eq!(scene.lights_affecting(near).len(), 2);
        let names: Vec<_> = scene.lights_affecting(far).iter().map(|l| l.name.clone()).collect();
        assert_eq!(names, vec!["sun".to_string()]);
    }

    #[test]
    fn test_visible_bounds_and_removal() {
        let (mut scene, _, far) = scene();
        assert_eq!(scene.visible_bounds().max.x, 101.0);
        scene.object_mut(far).and_then(SceneObject::as_entity_mut).unwrap().set_visible(false);
        assert_eq!(scene.visible_bounds().max.x, 1.0);
        assert!(scene.remove_object(far).is_some());
        assert_eq!(scene.object_count(), 1);
    }
}
