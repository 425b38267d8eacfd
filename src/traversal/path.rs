// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Positions within a selective walk.
//!
//! A [`Path`] names the spot a block was loaded at: the chain of map keys
//! and list indices crossed from the root block's node to the link. The
//! resume machinery uses paths two ways — the path tree records one per
//! loaded link, and a rewind target is a path the replay walks back to.
//!
//! Written paths use `/` between steps, `"left/0/data"`. An all-digit
//! step is read as a list index, so a parsed target compares equal to the
//! path a walk builds while crossing a list. DAG-CBOR map keys that look
//! numeric are rare enough that the ambiguity has not mattered in
//! practice.

use std::fmt;

/// One step of a [`Path`]: a map key or a list index in the node the
/// step crosses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    /// Key in a map node.
    Key(Box<str>),
    /// Index in a list node.
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(step: &str) -> Self {
        // all-digit steps mean list positions, see module docs
        match step.parse() {
            Ok(index) => PathSegment::Index(index),
            Err(_) => PathSegment::Key(step.into()),
        }
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Where a block sits in the walk: the steps from the root block down to
/// the link that loaded it. The root itself is the empty path.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    /// The steps of this path, root first.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Appends one step; used by engines while descending.
    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment)
    }

    /// The depth at which this path leaves the route to `target`, if it
    /// does. `None` means this path lies on the route: it is the target,
    /// an ancestor of it, or below it.
    ///
    /// During a path rewind, a divergent visit stands for a subtree the
    /// previous pass already produced, so the replay prunes it at the
    /// divergent step.
    pub fn divergence_from(&self, target: &Path) -> Option<usize> {
        self.segments
            .iter()
            .zip(&target.segments)
            .position(|(taken, wanted)| taken != wanted)
    }
}

impl From<&str> for Path {
    /// Parses a written path. Repeated, leading and trailing `/` are
    /// ignored, so `"/left//0/"` names the same position as `"left/0"`.
    fn from(route: &str) -> Self {
        route
            .split('/')
            .filter(|step| !step.is_empty())
            .map(PathSegment::from)
            .collect()
    }
}

impl FromIterator<PathSegment> for Path {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(steps: I) -> Self {
        Path {
            segments: steps.into_iter().collect(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut between = "";
        for segment in &self.segments {
            write!(f, "{between}{segment}")?;
            between = "/";
        }
        Ok(())
    }
}
