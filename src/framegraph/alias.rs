//! Copy elision through aliasing.

use super::resource::Aliasable;

/// Follows alias links from `index` to the declaration owning the memory.
pub(crate) fn alias_root<T: Aliasable>(infos: &[T], mut index: u32) -> u32 {
    while let Some(target) = infos[index as usize].alias_of() {
        index = target;
    }
    index
}

/// Turns every copy destination whose source is no longer needed once the
/// destination starts into an alias of the source. The root of the alias
/// chain takes over the destination's lifetime and usage.
///
/// Destinations are visited in declaration order, so the same graph always
/// aliases the same way. Returns the number of copies elided.
pub(crate) fn alias_copies<T: Aliasable>(infos: &mut [T]) -> usize {
    let mut elided = 0;
    for dst in 0..infos.len() as u32 {
        let Some(src) = infos[dst as usize].copy_src() else {
            continue;
        };
        if infos[dst as usize].alias_of().is_some() {
            continue;
        }
        let root = alias_root(infos, src);
        if root == dst {
            continue;
        }

        let (root_info, dst_info) = pair_mut(infos, root as usize, dst as usize);
        let eligible = !root_info.base().is_persistent()
            && !dst_info.base().is_persistent()
            && !dst_info.base().carried_over
            && root_info.same_shape(dst_info)
            && match (root_info.base().last_use(), dst_info.base().first_use) {
                (Some(last), Some(first)) => last <= first,
                _ => false,
            };
        if !eligible {
            continue;
        }

        root_info.base_mut().absorb(dst_info.base());
        root_info.absorb_usage(dst_info);
        dst_info.set_alias_of(root);
        log::debug!("aliasing resource {dst} onto {root}, copy from {src} elided");
        elided += 1;
    }
    elided
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
