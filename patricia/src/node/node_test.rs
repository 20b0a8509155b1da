// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

use proptest::collection::{hash_map, vec};
use proptest::prelude::*;

use super::*;
use crate::error::TrieError;
use crate::hash::EMPTY_ROOT_HASH;

fn path(hex: &str) -> Vec<Nibble> {
    hex.chars()
        .map(|c| Nibble::from(c.to_digit(16).unwrap() as u8))
        .collect()
}

fn hash_of(data: &[u8]) -> NodeHash {
    NodeHash::digest(data)
}

fn branch_with(children: &[(u8, NodeHash)]) -> BranchNode {
    let mut branch = BranchNode::default();
    for (slot, hash) in children {
        branch.ascend(*hash, Nibble::from(*slot));
    }
    branch
}

#[test]
fn test_encode_decode() {
    let leaf = Node::Leaf(LeafNode::new(path("cafe"), vec![0x01]));
    let ext = Node::Extension(ExtensionNode::new(path("ca"), hash_of(b"child")));
    let branch = Node::Branch(branch_with(&[
        (0xf, hash_of(b"left")),
        (0xb, hash_of(b"right")),
    ]));
    for node in [&leaf, &ext, &branch] {
        let bytes = node.encode().unwrap();
        assert_eq!(*node, Node::decode(&bytes).unwrap());
    }

    // Error cases
    if let Err(e) = Node::decode(&[]) {
        assert_eq!(
            e.downcast::<NodeDecodeError>().unwrap(),
            NodeDecodeError::EmptyInput
        );
    }
    if let Err(e) = Node::decode(&[100]) {
        assert_eq!(
            e.downcast::<NodeDecodeError>().unwrap(),
            NodeDecodeError::UnknownTag { unknown_tag: 100 }
        );
    }
}

#[test]
fn test_decode_rejects_bad_nibble() {
    let leaf = Node::Leaf(LeafNode::new(path("ca"), vec![0x01]));
    let mut bytes = leaf.encode().unwrap();
    // first path byte sits after the tag and the u32 length
    bytes[5] = 0x20;
    assert_eq!(
        Node::decode(&bytes).unwrap_err().downcast::<NodeDecodeError>().unwrap(),
        NodeDecodeError::InvalidNibble { nibble: 0x20 }
    );
}

#[test]
fn test_decode_rejects_trailing_bytes() {
    let leaf = Node::Leaf(LeafNode::new(path("ca"), vec![0x01]));
    let mut bytes = leaf.encode().unwrap();
    bytes.push(0xff);
    assert_eq!(
        Node::decode(&bytes).unwrap_err().downcast::<NodeDecodeError>().unwrap(),
        NodeDecodeError::TrailingBytes { remaining: 1 }
    );
}

#[test]
fn test_decode_rejects_bad_value_flag() {
    let branch = Node::Branch(branch_with(&[(0x1, hash_of(b"c"))]));
    let mut bytes = branch.encode().unwrap();
    let flag_pos = bytes.len() - 1;
    bytes[flag_pos] = 7;
    assert_eq!(
        Node::decode(&bytes).unwrap_err().downcast::<NodeDecodeError>().unwrap(),
        NodeDecodeError::UnknownValueFlag { flag: 7 }
    );
}

#[test]
fn test_decode_rejects_empty_extension_path() {
    // tag 1, path length 0, then a child hash
    let mut bytes = vec![1u8, 0, 0, 0, 0];
    bytes.extend_from_slice(hash_of(b"child").as_bytes());
    assert_eq!(
        Node::decode(&bytes).unwrap_err().downcast::<NodeDecodeError>().unwrap(),
        NodeDecodeError::EmptyExtensionPath
    );
}

#[test]
fn test_branch_value_slot_round_trips() {
    let mut branch = branch_with(&[(0x3, hash_of(b"c"))]);
    branch.value = Some(vec![0xaa, 0xbb]);
    let node = Node::Branch(branch);
    let bytes = node.encode().unwrap();
    assert_eq!(node, Node::decode(&bytes).unwrap());
}

#[test]
fn test_empty_branch_hashes_to_empty_root() {
    assert_eq!(BranchNode::default().merkle_hash(), *EMPTY_ROOT_HASH);
}

#[test]
fn test_branch_hash_depends_on_slot_assignment() {
    let a = branch_with(&[(0x1, hash_of(b"x"))]);
    let b = branch_with(&[(0x2, hash_of(b"x"))]);
    assert_ne!(a.merkle_hash(), b.merkle_hash());
    assert_ne!(a.merkle_hash(), *EMPTY_ROOT_HASH);
}

#[test]
fn test_leaf_and_extension_hashes_are_domain_separated() {
    // same path bytes, payload bytes of equal length
    let child = hash_of(b"payload");
    let leaf = LeafNode::new(path("ca"), child.to_vec());
    let ext = ExtensionNode::new(path("ca"), child);
    assert_ne!(leaf.merkle_hash(), ext.merkle_hash());
}

#[test]
fn test_occupancy_and_sole_occupant() {
    let mut branch = BranchNode::default();
    assert_eq!(branch.occupancy(), 0);
    assert_eq!(branch.sole_occupant(), None);

    let child = hash_of(b"c");
    branch.ascend(child, Nibble::from(0xb));
    assert_eq!(branch.occupancy(), 1);
    assert_eq!(branch.sole_occupant(), Some((Nibble::from(0xb), child)));

    branch.ascend(hash_of(b"d"), Nibble::from(0x2));
    assert_eq!(branch.occupancy(), 2);
    assert_eq!(branch.sole_occupant(), None);

    branch.clear_child(Nibble::from(0x2));
    assert_eq!(branch.sole_occupant(), Some((Nibble::from(0xb), child)));

    branch.value = Some(vec![0x01]);
    assert_eq!(branch.occupancy(), 2);
    assert_eq!(branch.sole_occupant(), None);
}

#[test]
fn test_step_at_branch() {
    let child = hash_of(b"c");
    let branch = Node::Branch(branch_with(&[(0xc, child)]));
    assert_eq!(
        branch.step(&path("cafe")),
        Step::Descend { child, matched: 0 }
    );
    assert_eq!(branch.step(&path("0afe")), Step::Diverge { matched: 0 });
}

#[test]
fn test_step_at_extension() {
    let child = hash_of(b"c");
    let ext = Node::Extension(ExtensionNode::new(path("ca"), child));
    assert_eq!(ext.step(&path("cafe")), Step::Descend { child, matched: 2 });
    assert_eq!(ext.step(&path("c0fe")), Step::Diverge { matched: 1 });
    // a key ending on the extension names no entry
    assert_eq!(ext.step(&path("ca")), Step::Diverge { matched: 2 });
}

#[test]
fn test_step_at_leaf() {
    let leaf = Node::Leaf(LeafNode::new(path("cafe"), vec![0x01]));
    assert_eq!(leaf.step(&path("cafe")), Step::Terminal { matched: 4 });
    assert_eq!(leaf.step(&path("cab0")), Step::Diverge { matched: 2 });
    // nesting keys diverge rather than match
    assert_eq!(leaf.step(&path("ca")), Step::Diverge { matched: 2 });
    assert_eq!(leaf.step(&path("cafe00")), Step::Diverge { matched: 4 });
}

#[test]
fn test_leaf_split_mints_extension_fork_and_leaves() {
    let leaf = LeafNode::new(path("cafe"), vec![0x01]);
    let mut minted = Vec::new();
    leaf.insert(&path("cab0"), &[0x02], &mut minted).unwrap();
    assert_eq!(minted.len(), 4);

    let moved = LeafNode::new(path("fe"), vec![0x01]);
    let added = LeafNode::new(path("b0"), vec![0x02]);
    let fork = branch_with(&[
        (0xf, moved.merkle_hash()),
        (0xb, added.merkle_hash()),
    ]);
    let top = ExtensionNode::new(path("ca"), fork.merkle_hash());

    assert_eq!(minted[0], Node::Extension(top));
    assert_eq!(minted[1], Node::Branch(fork));
    assert_eq!(minted[2], Node::Leaf(moved));
    assert_eq!(minted[3], Node::Leaf(added));
}

#[test]
fn test_leaf_split_rejects_nesting_keys() {
    let leaf = LeafNode::new(path("cafe"), vec![0x01]);
    let mut minted = Vec::new();
    let err = leaf.insert(&path("ca"), &[0x02], &mut minted).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TrieError>(),
        Some(TrieError::InvalidTrie)
    ));
    let err = leaf
        .insert(&path("cafe00"), &[0x02], &mut minted)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TrieError>(),
        Some(TrieError::InvalidTrie)
    ));
    assert!(minted.is_empty());
}

#[test]
fn test_extension_split_keeps_shared_prefix() {
    let downstream = hash_of(b"downstream-branch");
    let mut ext = ExtensionNode::new(path("caf"), downstream);
    let mut minted = Vec::new();
    ext.insert(&path("c0ff"), &[0x02], &mut minted).unwrap();

    // the node itself keeps the shared prefix and waits for the ascent
    assert_eq!(ext.path(), &path("c")[..]);
    assert_eq!(minted.len(), 3);

    let remnant = ExtensionNode::new(path("af"), downstream);
    let added = LeafNode::new(path("0ff"), vec![0x02]);
    let fork = branch_with(&[
        (0xa, remnant.merkle_hash()),
        (0x0, added.merkle_hash()),
    ]);
    assert_eq!(minted[0], Node::Branch(fork));
    assert_eq!(minted[1], Node::Extension(remnant));
    assert_eq!(minted[2], Node::Leaf(added));
}

#[test]
fn test_extension_split_rejects_key_ending_inside() {
    let mut ext = ExtensionNode::new(path("cafe"), hash_of(b"child"));
    let mut minted = Vec::new();
    let err = ext.insert(&path("ca"), &[0x02], &mut minted).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TrieError>(),
        Some(TrieError::InvalidTrie)
    ));
}

#[test]
fn test_blob() {
    let leaf = Node::Leaf(LeafNode::new(path("fe"), vec![0x01]));
    assert_eq!(leaf.blob().unwrap(), (&path("fe")[..], &[0x01][..]));

    let child = hash_of(b"child");
    let ext = Node::Extension(ExtensionNode::new(path("ca"), child));
    assert_eq!(ext.blob().unwrap(), (&path("ca")[..], child.as_bytes()));

    assert!(Node::Branch(BranchNode::default()).blob().is_err());
}

proptest! {
    #[test]
    fn test_leaf_round_trip(leaf in any::<LeafNode>()) {
        let node = Node::Leaf(leaf);
        let bytes = node.encode().unwrap();
        prop_assert_eq!(Node::decode(&bytes).unwrap(), node);
    }

    #[test]
    fn test_branch_round_trip(
        children in hash_map(any::<Nibble>(), vec(any::<u8>(), 32), 0..=16),
        value in proptest::option::of(vec(any::<u8>(), 0..32)),
    ) {
        let mut branch = BranchNode::default();
        for (slot, bytes) in children {
            let hash = NodeHash::from_slice(&bytes).unwrap();
            // the zero digest denotes an empty slot on the wire
            if !hash.is_zero() {
                branch.ascend(hash, slot);
            }
        }
        branch.value = value;
        let node = Node::Branch(branch);
        let bytes = node.encode().unwrap();
        prop_assert_eq!(Node::decode(&bytes).unwrap(), node);
    }

    #[test]
    fn test_extension_round_trip(
        raw_path in vec(any::<Nibble>(), 1..64),
        child in vec(any::<u8>(), 32),
    ) {
        let node = Node::Extension(ExtensionNode::new(
            raw_path,
            NodeHash::from_slice(&child).unwrap(),
        ));
        let bytes = node.encode().unwrap();
        prop_assert_eq!(Node::decode(&bytes).unwrap(), node);
    }
}
