//! Scene objects and the world that owns them.
//!
//! Objects are generic over the mesh type so the scene stays independent of
//! the GPU; the renderer uses `World<Mesh>`. Meshes are shared through `Arc`
//! and live as long as their last object.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;

use crate::light::PointLight;
use crate::transform::Transform;

/// Identity of an object, unique within its [`World`] and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One object in the scene.
#[derive(Debug)]
pub struct GameObject<M> {
    id: ObjectId,
    pub mesh: Option<Arc<M>>,
    /// Tint multiplied into the surface color.
    pub color: Vec3,
    pub transform: Transform,
    pub point_light: Option<PointLight>,
}

impl<M> GameObject<M> {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Whether the object has a mesh to draw.
    #[inline]
    pub fn is_drawable(&self) -> bool {
        self.mesh.is_some()
    }
}

/// Owns the objects of one scene, iterated in ascending id order.
#[derive(Debug)]
pub struct World<M> {
    next_id: u32,
    objects: BTreeMap<ObjectId, GameObject<M>>,
}

impl<M> Default for World<M> {
    fn default() -> Self {
        Self {
            next_id: 0,
            objects: BTreeMap::new(),
        }
    }
}

impl<M> World<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty object with an identity transform.
    pub fn spawn(&mut self) -> &mut GameObject<M> {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.entry(id).or_insert(GameObject {
            id,
            mesh: None,
            color: Vec3::ONE,
            transform: Transform::default(),
            point_light: None,
        })
    }

    /// Creates an object carrying a mesh.
    pub fn spawn_mesh(&mut self, mesh: Arc<M>, transform: Transform) -> &mut GameObject<M> {
        let object = self.spawn();
        object.mesh = Some(mesh);
        object.transform = transform;
        object
    }

    /// Creates a point light at `position` with billboard radius `radius`.
    pub fn spawn_point_light(
        &mut self,
        position: Vec3,
        radius: f32,
        color: Vec3,
        intensity: f32,
    ) -> &mut GameObject<M> {
        let object = self.spawn();
        object.color = color;
        object.transform = Transform::new()
            .with_translation(position)
            .with_scale(Vec3::new(radius, 1.0, 1.0));
        object.point_light = Some(PointLight { color, intensity });
        object
    }

    pub fn get(&self, id: ObjectId) -> Option<&GameObject<M>> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject<M>> {
        self.objects.get_mut(&id)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<GameObject<M>> {
        self.objects.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameObject<M>> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GameObject<M>> {
        self.objects.values_mut()
    }

    /// Objects with a mesh, in id order.
    pub fn drawables(&self) -> impl Iterator<Item = &GameObject<M>> {
        self.iter().filter(|object| object.is_drawable())
    }

    /// Objects with a point light component, in id order.
    pub fn point_lights(&self) -> impl Iterator<Item = (&GameObject<M>, &PointLight)> {
        self.iter()
            .filter_map(|object| object.point_light.as_ref().map(|light| (object, light)))
    }

    pub fn drawable_count(&self) -> usize {
        self.drawables().count()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic_and_not_reused() {
        let mut world: World<()> = World::new();
        let a = world.spawn().id();
        let b = world.spawn().id();
        world.remove(b);
        let c = world.spawn().id();
        assert!(a < b && b < c);
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn test_worlds_do_not_share_ids() {
        let mut first: World<()> = World::new();
        let mut second: World<()> = World::new();
        first.spawn();
        first.spawn();
        assert_eq!(second.spawn().id().raw(), 0);
    }

    #[test]
    fn test_shared_mesh_outlives_removed_objects() {
        let mut world = World::new();
        let mesh = Arc::new("cube");
        let a = world.spawn_mesh(Arc::clone(&mesh), Transform::new()).id();
        let b = world.spawn_mesh(Arc::clone(&mesh), Transform::new()).id();
        assert_eq!(Arc::strong_count(&mesh), 3);

        world.remove(a);
        assert_eq!(Arc::strong_count(&mesh), 2);
        assert_eq!(world.get(b).and_then(|o| o.mesh.as_deref()), Some(&"cube"));
    }

    #[test]
    fn test_drawables_and_lights_in_id_order() {
        let mut world = World::new();
        world.spawn_mesh(Arc::new(1u8), Transform::new());
        world.spawn_point_light(Vec3::new(0.0, -1.0, 0.0), 0.1, Vec3::X, 2.0);
        world.spawn();
        world.spawn_mesh(Arc::new(2u8), Transform::new());

        let meshes: Vec<u8> = world
            .drawables()
            .filter_map(|o| o.mesh.as_deref().copied())
            .collect();
        assert_eq!(meshes, vec![1, 2]);
        assert_eq!(world.drawable_count(), 2);

        let lights: Vec<_> = world.point_lights().collect();
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].1.intensity, 2.0);
        assert_eq!(lights[0].0.transform.scale.x, 0.1);
    }
}
