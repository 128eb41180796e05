use proptest::prelude::*;
use std::collections::BTreeMap;

use crate::collections::AvlTree;
use crate::config::Config;

#[derive(Clone, Debug)]
enum Op {
    Insert(i32, u64),
    Remove(i32),
    Get(i32),
}

fn key_strategy() -> impl Strategy<Value = i32> + Clone {
    // a narrow key range makes overwrites and hits on removal common
    -256i32..256
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        30 => key.clone().prop_map(Op::Remove),
        20 => key.clone().prop_map(Op::Get),
    ];
    prop::collection::vec(op, 0..=1000)
}

fn entries_strategy() -> impl Strategy<Value = Vec<(i32, u64)>> {
    prop::collection::vec((key_strategy(), any::<u64>()), 0..=200)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in ops_strategy()) {
        let tree: AvlTree<u64> = AvlTree::new();
        let mut model: BTreeMap<i32, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    let old_tree = tree.insert(key, value).unwrap();
                    let old_model = model.insert(key, value);
                    prop_assert_eq!(old_tree, old_model);
                }
                Op::Remove(key) => {
                    let old_tree = tree.remove(key);
                    let old_model = model.remove(&key);
                    prop_assert_eq!(old_tree, old_model);
                }
                Op::Get(key) => {
                    prop_assert_eq!(tree.get(key), model.get(&key).copied());
                    prop_assert_eq!(tree.contains(key), model.contains_key(&key));
                }
            }

            tree.validate();
            prop_assert_eq!(tree.len(), model.len());
        }

        let got: Vec<(i32, u64)> = tree.in_order_traversal().into_iter().collect();
        let expected: Vec<(i32, u64)> = model.into_iter().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_merge_prefers_other(left in entries_strategy(), right in entries_strategy()) {
        let tree = AvlTree::new();
        let other = AvlTree::new();
        let mut model = BTreeMap::new();

        for (key, value) in &left {
            tree.insert(*key, *value).unwrap();
            model.insert(*key, *value);
        }
        for (key, value) in &right {
            other.insert(*key, *value).unwrap();
        }
        let other_before: Vec<(i32, u64)> = other.in_order_traversal().into_iter().collect();
        model.extend(other_before.iter().copied());

        tree.merge(&other).unwrap();

        tree.validate();
        let got: Vec<(i32, u64)> = tree.in_order_traversal().into_iter().collect();
        let expected: Vec<(i32, u64)> = model.into_iter().collect();
        prop_assert_eq!(got, expected);

        let other_after: Vec<(i32, u64)> = other.in_order_traversal().into_iter().collect();
        prop_assert_eq!(other_after, other_before);
    }

    #[test]
    fn prop_bounded_tree_never_exceeds_capacity(
        capacity in 1u32..64,
        ops in ops_strategy(),
    ) {
        let tree: AvlTree<u64> = AvlTree::with_config(Config::with_capacity(capacity)).unwrap();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    let was_full = tree.is_full();
                    let present = tree.contains(key);

                    match tree.insert(key, value) {
                        Ok(_) => prop_assert!(present || !was_full),
                        Err(_) => prop_assert!(was_full && !present),
                    }
                }
                Op::Remove(key) => {
                    tree.remove(key);
                }
                Op::Get(key) => {
                    tree.get(key);
                }
            }

            tree.validate();
            prop_assert!(tree.len() <= capacity as usize);
        }
    }
}
