//! fixed-arity and append-only Merkle trees
//!
//! [`StaticMerkleTree`] backs one-shot commitments (the WOTS+ key-pool
//! root); [`AppendOnlyMerkleTree`] backs the anonymity pool's growing
//! deposit set. Both share the same [`MerkleProof`] shape and the same
//! [`verify`] routine.

use std::collections::HashMap;

use siaac_hash::{hash_dom, tags, HashDigest};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("merkle tree has no leaves")]
    EmptyLeaves,
    #[error("index {index} out of range (tree has {len} leaves)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("leaf not found in tree")]
    LeafNotFound,
}

/// the canonical zero-leaf: `H_dom("LEAF", [])`.
pub fn zero_leaf() -> HashDigest {
    hash_dom(tags::LEAF, &[])
}

fn hash_node(left: &HashDigest, right: &HashDigest) -> HashDigest {
    hash_dom(tags::NODE, &[left, right])
}

fn next_pow2(n: usize) -> usize {
    if n <= 1 {
        1
    } else {
        n.next_power_of_two()
    }
}

/// inclusion proof for a single leaf; `siblings[level]` is the node on the
/// other side of the path at that level, `path_bits[level]` is true iff
/// the node on the path at that level is the right child.
///
/// On the wire, `siblings` is a JSON array of lowercase hex strings,
/// matching §6.5's `siblingsHex[]`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MerkleProof {
    #[cfg_attr(feature = "serde", serde(with = "siaac_hash::encoding::hex_digest_vec"))]
    pub siblings: Vec<HashDigest>,
    pub path_bits: Vec<bool>,
    pub leaf_index: usize,
}

impl MerkleProof {
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }
}

/// recompute a root from `leaf` and `proof`, then compare to `root` in
/// constant time. Used by both tree variants.
pub fn verify(proof: &MerkleProof, leaf: &HashDigest, root: &HashDigest) -> bool {
    if proof.siblings.len() != proof.path_bits.len() {
        return false;
    }
    let mut current = *leaf;
    for (sibling, is_right) in proof.siblings.iter().zip(proof.path_bits.iter()) {
        current = if *is_right {
            hash_node(sibling, &current)
        } else {
            hash_node(&current, sibling)
        };
    }
    siaac_hash::bytes_equal(&current, root)
}

/// fixed-size tree built once from a leaf sequence, padded with
/// [`zero_leaf`] up to the next power of two.
#[derive(Clone, Debug)]
pub struct StaticMerkleTree {
    layers: Vec<Vec<HashDigest>>,
    num_real_leaves: usize,
}

impl StaticMerkleTree {
    pub fn from_leaves(leaves: &[HashDigest]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::EmptyLeaves);
        }

        let padded_len = next_pow2(leaves.len());
        let mut layer: Vec<HashDigest> = Vec::with_capacity(padded_len);
        layer.extend_from_slice(leaves);
        layer.resize(padded_len, zero_leaf());

        let mut layers = vec![layer];
        while layers.last().unwrap().len() > 1 {
            let prev = layers.last().unwrap();
            let next: Vec<HashDigest> = prev
                .chunks_exact(2)
                .map(|pair| hash_node(&pair[0], &pair[1]))
                .collect();
            layers.push(next);
        }

        Ok(Self {
            layers,
            num_real_leaves: leaves.len(),
        })
    }

    pub fn root(&self) -> HashDigest {
        self.layers.last().unwrap()[0]
    }

    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    pub fn num_leaves(&self) -> usize {
        self.num_real_leaves
    }

    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        let leaf_count = self.layers[0].len();
        if index >= leaf_count {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.num_real_leaves,
            });
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut path_bits = Vec::with_capacity(self.depth());
        let mut current_index = index;

        for layer in &self.layers[..self.layers.len() - 1] {
            let is_right = current_index % 2 == 1;
            let sibling_index = if is_right {
                current_index - 1
            } else {
                current_index + 1
            };
            siblings.push(layer[sibling_index]);
            path_bits.push(is_right);
            current_index /= 2;
        }

        Ok(MerkleProof {
            siblings,
            path_bits,
            leaf_index: index,
        })
    }
}

/// fixed-depth append-only tree: leaves are added one at a time, the root
/// is recomputed in O(depth) per append, and proofs can be generated for
/// any previously appended leaf.
#[derive(Clone, Debug)]
pub struct AppendOnlyMerkleTree {
    depth: usize,
    zero_hashes: Vec<HashDigest>,
    /// layers[0] holds real leaves in insertion order; layers[l] for l>0
    /// holds only the internal nodes computed so far (trailing positions
    /// not yet written are implicitly `zero_hashes[l]`).
    layers: Vec<Vec<HashDigest>>,
    leaf_index: HashMap<HashDigest, usize>,
}

impl AppendOnlyMerkleTree {
    pub fn new(depth: usize) -> Self {
        let mut zero_hashes = Vec::with_capacity(depth + 1);
        zero_hashes.push(zero_leaf());
        for l in 0..depth {
            let z = zero_hashes[l];
            zero_hashes.push(hash_node(&z, &z));
        }

        Self {
            depth,
            zero_hashes,
            layers: vec![Vec::new(); depth + 1],
            leaf_index: HashMap::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn num_leaves(&self) -> usize {
        self.layers[0].len()
    }

    pub fn capacity(&self) -> usize {
        1usize << self.depth
    }

    /// leaves in insertion order, for export/persistence. Rebuilding a tree
    /// from this slice via repeated [`AppendOnlyMerkleTree::append`] yields
    /// an identical root.
    pub fn leaves(&self) -> &[HashDigest] {
        &self.layers[0]
    }

    /// append a leaf, returning its index and the new root.
    pub fn append(&mut self, leaf: HashDigest) -> (usize, HashDigest) {
        let index = self.layers[0].len();
        self.layers[0].push(leaf);
        self.leaf_index.insert(leaf, index);

        let mut current_index = index;
        for level in 0..self.depth {
            let left = self.node_at(level, current_index & !1);
            let right = self.node_at(level, (current_index & !1) + 1);
            let parent = hash_node(&left, &right);

            let parent_index = current_index / 2;
            let parent_layer = &mut self.layers[level + 1];
            if parent_layer.len() == parent_index {
                parent_layer.push(parent);
            } else {
                parent_layer[parent_index] = parent;
            }
            current_index = parent_index;
        }

        (index, self.current_root())
    }

    fn node_at(&self, level: usize, index: usize) -> HashDigest {
        self.layers[level]
            .get(index)
            .copied()
            .unwrap_or(self.zero_hashes[level])
    }

    pub fn current_root(&self) -> HashDigest {
        self.node_at(self.depth, 0)
    }

    pub fn index_of(&self, leaf: &HashDigest) -> Option<usize> {
        self.leaf_index.get(leaf).copied()
    }

    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        let leaf_count = self.layers[0].len();
        if index >= leaf_count {
            return Err(Error::IndexOutOfRange {
                index,
                len: leaf_count,
            });
        }

        let mut siblings = Vec::with_capacity(self.depth);
        let mut path_bits = Vec::with_capacity(self.depth);
        let mut current_index = index;

        for level in 0..self.depth {
            let is_right = current_index % 2 == 1;
            let sibling_index = if is_right {
                current_index - 1
            } else {
                current_index + 1
            };
            siblings.push(self.node_at(level, sibling_index));
            path_bits.push(is_right);
            current_index /= 2;
        }

        Ok(MerkleProof {
            siblings,
            path_bits,
            leaf_index: index,
        })
    }

    pub fn proof_for_leaf(&self, leaf: &HashDigest) -> Result<MerkleProof> {
        let index = self.index_of(leaf).ok_or(Error::LeafNotFound)?;
        self.proof(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn rand_leaf() -> HashDigest {
        let mut b = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut b);
        b
    }

    #[test]
    fn empty_leaves_rejected() {
        assert_eq!(StaticMerkleTree::from_leaves(&[]).unwrap_err(), Error::EmptyLeaves);
    }

    #[test]
    fn single_leaf_tree_has_depth_zero() {
        let leaf = rand_leaf();
        let tree = StaticMerkleTree::from_leaves(&[leaf]).unwrap();
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.root(), leaf);
    }

    #[test]
    fn static_tree_determinism() {
        let leaves: Vec<HashDigest> = (0..5).map(|_| rand_leaf()).collect();
        let t1 = StaticMerkleTree::from_leaves(&leaves).unwrap();
        let t2 = StaticMerkleTree::from_leaves(&leaves).unwrap();
        assert_eq!(t1.root(), t2.root());
    }

    #[test]
    fn static_tree_pads_with_domain_separated_zero() {
        // 3 leaves pad to 4; root must differ from a tree built with an
        // all-zero-byte padding leaf (second-preimage resistance check).
        let leaves: Vec<HashDigest> = (0..3).map(|_| rand_leaf()).collect();
        let tree = StaticMerkleTree::from_leaves(&leaves).unwrap();
        let mut naive = leaves.clone();
        naive.push([0u8; 32]);
        let naive_tree = StaticMerkleTree::from_leaves(&naive).unwrap();
        assert_ne!(tree.root(), naive_tree.root());
    }

    #[test]
    fn every_leaf_has_a_valid_proof() {
        let leaves: Vec<HashDigest> = (0..13).map(|_| rand_leaf()).collect();
        let tree = StaticMerkleTree::from_leaves(&leaves).unwrap();
        let root = tree.root();
        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.proof(i).unwrap();
            assert!(verify(&proof, leaf, &root));
        }
    }

    #[test]
    fn wrong_leaf_rejected() {
        let leaves: Vec<HashDigest> = (0..8).map(|_| rand_leaf()).collect();
        let tree = StaticMerkleTree::from_leaves(&leaves).unwrap();
        let root = tree.root();
        let proof = tree.proof(2).unwrap();
        assert!(!verify(&proof, &rand_leaf(), &root));
    }

    #[test]
    fn corrupted_sibling_rejected() {
        let leaves: Vec<HashDigest> = (0..8).map(|_| rand_leaf()).collect();
        let tree = StaticMerkleTree::from_leaves(&leaves).unwrap();
        let root = tree.root();
        let mut proof = tree.proof(5).unwrap();
        proof.siblings[0][0] ^= 0x01;
        assert!(!verify(&proof, &leaves[5], &root));
    }

    #[test]
    fn index_out_of_range() {
        let leaves: Vec<HashDigest> = (0..4).map(|_| rand_leaf()).collect();
        let tree = StaticMerkleTree::from_leaves(&leaves).unwrap();
        assert!(matches!(tree.proof(4), Err(Error::IndexOutOfRange { .. })));
    }

    #[test]
    fn append_only_matches_static_after_full_capacity() {
        let depth = 3; // capacity 8
        let mut append_tree = AppendOnlyMerkleTree::new(depth);
        let leaves: Vec<HashDigest> = (0..8).map(|_| rand_leaf()).collect();
        for leaf in &leaves {
            append_tree.append(*leaf);
        }
        let static_tree = StaticMerkleTree::from_leaves(&leaves).unwrap();
        assert_eq!(append_tree.current_root(), static_tree.root());
    }

    #[test]
    fn append_only_proofs_valid_at_every_fill_level() {
        let depth = 4;
        let mut tree = AppendOnlyMerkleTree::new(depth);
        let mut leaves = Vec::new();
        for _ in 0..6 {
            let leaf = rand_leaf();
            let (idx, root) = tree.append(leaf);
            leaves.push(leaf);
            for (i, l) in leaves.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(verify(&proof, l, &root));
            }
            assert_eq!(idx, leaves.len() - 1);
        }
    }

    #[test]
    fn append_only_empty_tree_root_is_zero_subtree() {
        let depth = 5;
        let tree = AppendOnlyMerkleTree::new(depth);
        assert_eq!(tree.current_root(), tree.zero_hashes[depth]);
    }

    #[test]
    fn proof_for_leaf_lookup() {
        let mut tree = AppendOnlyMerkleTree::new(4);
        let a = rand_leaf();
        let b = rand_leaf();
        tree.append(a);
        let (idx_b, root) = tree.append(b);
        let proof = tree.proof_for_leaf(&b).unwrap();
        assert_eq!(proof.leaf_index, idx_b);
        assert!(verify(&proof, &b, &root));
    }

    #[test]
    fn proof_for_unknown_leaf_not_found() {
        let mut tree = AppendOnlyMerkleTree::new(4);
        tree.append(rand_leaf());
        assert_eq!(
            tree.proof_for_leaf(&rand_leaf()).unwrap_err(),
            Error::LeafNotFound
        );
    }
}
