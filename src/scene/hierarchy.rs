use glam::Mat4;
use hecs::World;

use crate::scene::components::{Active, Children, Parent, TransformComponent, WorldTransform};

/// Makes `child` a child of `parent`, detaching it from any previous parent.
/// Returns false when either entity is gone or the link would form a cycle.
pub fn set_parent(world: &mut World, child: hecs::Entity, parent: hecs::Entity) -> bool {
    if child == parent || !world.contains(child) || !world.contains(parent) {
        return false;
    }
    if is_ancestor(world, child, parent) {
        log::warn!("Refusing to parent {:?} under its own descendant {:?}", child, parent);
        return false;
    }

    detach(world, child);

    if world.insert_one(child, Parent(parent)).is_err() {
        return false;
    }
    let has_children = world.get::<&Children>(parent).is_ok();
    if has_children {
        if let Ok(mut children) = world.get::<&mut Children>(parent) {
            children.0.push(child);
        }
    } else if world.insert_one(parent, Children(vec![child])).is_err() {
        return false;
    }
    true
}

/// Removes `child` from its parent, making it a root.
pub fn detach(world: &mut World, child: hecs::Entity) {
    let Ok(Parent(previous)) = world.remove_one::<Parent>(child) else {
        return;
    };
    if let Ok(mut children) = world.get::<&mut Children>(previous) {
        children.0.retain(|&c| c != child);
    }
}

fn is_ancestor(world: &World, ancestor: hecs::Entity, mut entity: hecs::Entity) -> bool {
    loop {
        let parent = match world.get::<&Parent>(entity) {
            Ok(parent) => parent.0,
            Err(_) => return false,
        };
        if parent == ancestor {
            return true;
        }
        entity = parent;
    }
}

/// Recomputes every [`WorldTransform`] from the local transforms, walking the
/// hierarchy from the roots. Activity is inherited: a child of an inactive
/// entity is inactive.
pub(crate) fn propagate_transforms(world: &mut World) {
    let roots: Vec<hecs::Entity> = world
        .query::<&TransformComponent>()
        .without::<&Parent>()
        .iter()
        .map(|(entity, _)| entity)
        .collect();

    log::trace!("Propagating transforms from {} root entities", roots.len());

    let mut stack: Vec<(hecs::Entity, WorldTransform)> = Vec::new();
    let mut missing: Vec<(hecs::Entity, WorldTransform)> = Vec::new();

    for root in roots {
        stack.push((
            root,
            WorldTransform {
                matrix: Mat4::IDENTITY,
                active: true,
            },
        ));

        while let Some((entity, parent_world)) = stack.pop() {
            let local = match world.get::<&TransformComponent>(entity) {
                Ok(t) => t.0,
                Err(_) => {
                    log::trace!("Entity {:?} has no TransformComponent, skipping", entity);
                    continue;
                }
            };
            let own_active = world.get::<&Active>(entity).map(|a| a.0).unwrap_or(true);

            let computed = WorldTransform {
                matrix: parent_world.matrix * local.matrix(),
                active: parent_world.active && own_active,
            };

            match world.get::<&mut WorldTransform>(entity) {
                Ok(mut wt) => *wt = computed,
                Err(_) => missing.push((entity, computed)),
            }

            if let Ok(children) = world.get::<&Children>(entity) {
                for &child in children.0.iter().rev() {
                    stack.push((child, computed));
                }
            }
        }
    }

    for (entity, computed) in missing {
        if let Err(e) = world.insert_one(entity, computed) {
            log::error!(
                "Failed to insert WorldTransform for entity {:?}: {:?}",
                entity,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::components::Name;
    use crate::scene::Transform;
    use glam::{Quat, Vec3};

    fn spawn_at(world: &mut World, name: &str, translation: Vec3) -> hecs::Entity {
        world.spawn((
            Name::new(name),
            TransformComponent(Transform::from_translation(translation)),
        ))
    }

    fn world_translation(world: &World, entity: hecs::Entity) -> Vec3 {
        world
            .get::<&WorldTransform>(entity)
            .unwrap()
            .matrix
            .w_axis
            .truncate()
    }

    #[test]
    fn child_inherits_parent_translation() {
        let mut world = World::new();
        let parent = spawn_at(&mut world, "Parent", Vec3::new(5.0, 0.0, 0.0));
        let child = spawn_at(&mut world, "Child", Vec3::new(2.0, 0.0, 0.0));
        assert!(set_parent(&mut world, child, parent));

        propagate_transforms(&mut world);

        assert_eq!(world_translation(&world, parent), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(world_translation(&world, child), Vec3::new(7.0, 0.0, 0.0));
    }

    #[test]
    fn child_inherits_parent_rotation() {
        let mut world = World::new();
        let parent = world.spawn((TransformComponent(
            Transform::IDENTITY.with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)),
        ),));
        let child = spawn_at(&mut world, "Child", Vec3::X);
        set_parent(&mut world, child, parent);

        propagate_transforms(&mut world);

        assert!(world_translation(&world, child).abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn inactive_parent_deactivates_descendants() {
        let mut world = World::new();
        let root = spawn_at(&mut world, "Root", Vec3::ZERO);
        let mid = spawn_at(&mut world, "Mid", Vec3::ZERO);
        let leaf = spawn_at(&mut world, "Leaf", Vec3::ZERO);
        set_parent(&mut world, mid, root);
        set_parent(&mut world, leaf, mid);
        world.insert_one(mid, Active(false)).unwrap();

        propagate_transforms(&mut world);

        assert!(world.get::<&WorldTransform>(root).unwrap().active);
        assert!(!world.get::<&WorldTransform>(mid).unwrap().active);
        assert!(!world.get::<&WorldTransform>(leaf).unwrap().active);
    }

    #[test]
    fn propagation_updates_existing_world_transforms() {
        let mut world = World::new();
        let parent = spawn_at(&mut world, "Parent", Vec3::ZERO);
        let child = spawn_at(&mut world, "Child", Vec3::new(2.0, 0.0, 0.0));
        set_parent(&mut world, child, parent);
        propagate_transforms(&mut world);

        world
            .get::<&mut TransformComponent>(parent)
            .unwrap()
            .0
            .translation = Vec3::new(1.0, 0.0, 0.0);
        propagate_transforms(&mut world);

        assert_eq!(world_translation(&world, child), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn reparenting_rejects_cycles_and_moves_children() {
        let mut world = World::new();
        let a = spawn_at(&mut world, "A", Vec3::ZERO);
        let b = spawn_at(&mut world, "B", Vec3::ZERO);
        let c = spawn_at(&mut world, "C", Vec3::ZERO);
        assert!(set_parent(&mut world, b, a));
        assert!(!set_parent(&mut world, a, b));

        assert!(set_parent(&mut world, b, c));
        assert!(world.get::<&Children>(a).unwrap().0.is_empty());
        assert_eq!(world.get::<&Children>(c).unwrap().0, vec![b]);
    }
}
