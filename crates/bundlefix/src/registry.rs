//! Identifier registry and allocator.
//!
//! The allocator is the core of the engine. It walks the scanner's node
//! list in two passes: the main bundle's identifier is protected and
//! registered first, then every other node is resolved against the
//! registry. Replacement identifiers are derived from the bundle's own
//! path (`<main>.<kindTag>.<sanitizedName>`), never from volatile data
//! like timestamps or process ids, so repeated runs over the same input
//! produce identical output.

use crate::bundle::{is_valid_identifier, sanitize_name, BundleKind, BundleNode};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// How aggressively non-main identifiers are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RewriteMode {
    /// Rewrite only missing or colliding identifiers.
    #[default]
    OnCollision,
    /// Rewrite every non-main identifier to its synthesized form.
    Always,
}

/// Why a node's identifier did or did not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeReason {
    /// The main bundle; its identifier is pinned to the configured value.
    MainProtected,
    /// The identifier was already valid and unique.
    Unchanged,
    /// The identifier equalled the main identifier.
    CollisionWithMain,
    /// The identifier was already claimed by an earlier sibling.
    SiblingCollision,
    /// The metadata carried no identifier at all.
    MissingIdentifier,
    /// The identifier contained characters outside `[A-Za-z0-9._-]`.
    InvalidCharacters,
    /// Rewritten unconditionally under [`RewriteMode::Always`].
    Forced,
}

/// Mapping from identifier to the bundle that owns it, built incrementally
/// during allocation and used to detect collisions.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    map: BTreeMap<String, PathBuf>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.map.contains_key(identifier)
    }

    pub fn owner(&self, identifier: &str) -> Option<&PathBuf> {
        self.map.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn insert(&mut self, identifier: String, owner: PathBuf) {
        self.map.insert(identifier, owner);
    }
}

/// Totals accumulated during allocation, reported after verification.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AllocationSummary {
    /// Nodes whose identifier collided with the main identifier or a sibling.
    pub collisions_found: usize,
    /// Collisions resolved with a new identifier (always equals
    /// `collisions_found`; a collision is never left in place).
    pub collisions_fixed: usize,
    /// Nodes that carried no identifier and received a synthesized one.
    pub missing_fixed: usize,
    /// Nodes left untouched.
    pub unchanged: usize,
}

/// Resolve identifiers for every node, in scan order.
///
/// On success every node's `assigned_identifier` is `Some`, the returned
/// registry maps each final identifier to its owner, and the returned
/// reasons align index-for-index with `nodes`.
///
/// # Errors
///
/// Returns [`Error::Allocation`] if `main_identifier` is empty or contains
/// disallowed characters, if `nodes` is empty, or if the first node is not
/// the main bundle.
pub fn allocate(
    nodes: &mut [BundleNode],
    main_identifier: &str,
    mode: RewriteMode,
) -> Result<(IdentifierRegistry, AllocationSummary, Vec<ChangeReason>)> {
    if !is_valid_identifier(main_identifier) {
        return Err(Error::Allocation(format!(
            "invalid main identifier {:?}: must match [A-Za-z0-9._-]+",
            main_identifier
        )));
    }
    if nodes.is_empty() {
        return Err(Error::Allocation(
            "no bundles discovered: no application root found".to_string(),
        ));
    }
    if nodes[0].kind != BundleKind::Main {
        return Err(Error::Allocation(
            "first scanned node is not the main bundle".to_string(),
        ));
    }

    let mut registry = IdentifierRegistry::new();
    let mut summary = AllocationSummary::default();
    let mut reasons = Vec::with_capacity(nodes.len());

    // Pass 1: the main bundle keeps the configured identifier, always.
    nodes[0].assigned_identifier = Some(main_identifier.to_string());
    registry.insert(main_identifier.to_string(), nodes[0].path.clone());
    reasons.push(ChangeReason::MainProtected);

    // Pass 2: resolve the rest in scan order.
    for node in nodes.iter_mut().skip(1) {
        let reason = decide(node, main_identifier, &registry, mode);

        let assigned = match (reason, node.current_identifier.as_deref()) {
            (ChangeReason::Unchanged, Some(current)) => {
                summary.unchanged += 1;
                current.to_string()
            }
            (ChangeReason::SiblingCollision, Some(current)) => {
                summary.collisions_found += 1;
                summary.collisions_fixed += 1;
                // Keep the vendor's base identifier and disambiguate it,
                // rather than renaming to the synthesized form.
                probe(current.to_string(), &registry)
            }
            (ChangeReason::CollisionWithMain, _) => {
                summary.collisions_found += 1;
                summary.collisions_fixed += 1;
                probe(synthesize(node, main_identifier), &registry)
            }
            (ChangeReason::MissingIdentifier, _) => {
                summary.missing_fixed += 1;
                probe(synthesize(node, main_identifier), &registry)
            }
            _ => probe(synthesize(node, main_identifier), &registry),
        };

        if node.current_identifier.as_deref() != Some(assigned.as_str()) {
            debug!(
                path = %node.path.display(),
                from = node.current_identifier.as_deref().unwrap_or("<none>"),
                to = %assigned,
                ?reason,
                "identifier reassigned"
            );
        }

        registry.insert(assigned.clone(), node.path.clone());
        node.assigned_identifier = Some(assigned);
        reasons.push(reason);
    }

    Ok((registry, summary, reasons))
}

/// Classify one non-main node against the registry.
fn decide(
    node: &BundleNode,
    main_identifier: &str,
    registry: &IdentifierRegistry,
    mode: RewriteMode,
) -> ChangeReason {
    match node.current_identifier.as_deref() {
        None => ChangeReason::MissingIdentifier,
        Some(current) if current == main_identifier => ChangeReason::CollisionWithMain,
        Some(current) if registry.contains(current) => ChangeReason::SiblingCollision,
        Some(current) if !is_valid_identifier(current) => ChangeReason::InvalidCharacters,
        Some(_) if mode == RewriteMode::Always => ChangeReason::Forced,
        Some(_) => ChangeReason::Unchanged,
    }
}

/// Deterministic candidate for a node: `<main>.<kindTag>.<sanitizedName>`.
fn synthesize(node: &BundleNode, main_identifier: &str) -> String {
    format!(
        "{}.{}.{}",
        main_identifier,
        node.kind.tag(),
        sanitize_name(&node.name())
    )
}

/// Return `base` if free, otherwise the first free `base.N`.
///
/// Terminates in at most N probes for N registered identifiers.
fn probe(base: String, registry: &IdentifierRegistry) -> String {
    if !registry.contains(&base) {
        return base;
    }
    let mut n = 1usize;
    loop {
        let candidate = format!("{}.{}", base, n);
        if !registry.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
