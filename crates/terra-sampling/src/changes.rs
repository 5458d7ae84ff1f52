//! Scene change requests accumulated during a sampling update.

use terra_quadtree::Node;

/// Identifier of a drawable owned by the rendering side.
pub type DrawableId = u64;

/// One change to apply to the scene after an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeRequest {
    /// Create a drawable for a tile.
    AddDrawable { id: DrawableId, node: Node },
    RemoveDrawable { id: DrawableId },
    /// Show or hide a drawable.
    OnOff { id: DrawableId, enable: bool },
}

impl ChangeRequest {
    pub fn id(&self) -> DrawableId {
        match *self {
            ChangeRequest::AddDrawable { id, .. }
            | ChangeRequest::RemoveDrawable { id }
            | ChangeRequest::OnOff { id, .. } => id,
        }
    }
}

/// Ordered batch of [`ChangeRequest`]s, applied by the caller in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    requests: Vec<ChangeRequest>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: ChangeRequest) {
        self.requests.push(request);
    }

    /// Append every request of `other`, keeping their order.
    pub fn merge(&mut self, other: ChangeSet) {
        self.requests.extend(other.requests);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRequest> {
        self.requests.iter()
    }

    pub fn into_inner(self) -> Vec<ChangeRequest> {
        self.requests
    }
}

impl Extend<ChangeRequest> for ChangeSet {
    fn extend<T: IntoIterator<Item = ChangeRequest>>(&mut self, iter: T) {
        self.requests.extend(iter);
    }
}

impl IntoIterator for ChangeSet {
    type Item = ChangeRequest;
    type IntoIter = std::vec::IntoIter<ChangeRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeRequest;
    type IntoIter = std::slice::Iter<'a, ChangeRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_order() {
        let mut a = ChangeSet::new();
        a.push(ChangeRequest::AddDrawable {
            id: 1,
            node: Node::ROOT,
        });
        let mut b = ChangeSet::new();
        b.push(ChangeRequest::OnOff {
            id: 1,
            enable: false,
        });
        b.push(ChangeRequest::RemoveDrawable { id: 1 });
        a.merge(b);
        let ids: Vec<_> = a.iter().map(ChangeRequest::id).collect();
        assert_eq!(ids, vec![1, 1, 1]);
        assert!(matches!(a.into_inner()[2], ChangeRequest::RemoveDrawable { id: 1 }));
    }

    #[test]
    fn test_empty_set() {
        let mut changes = ChangeSet::new();
        assert!(changes.is_empty());
        changes.extend([ChangeRequest::RemoveDrawable { id: 7 }]);
        assert_eq!(changes.len(), 1);
    }
}
