use std::collections::{BTreeMap, VecDeque};

use log::{debug, warn};
use sea_orm::ConnectionTrait;

use hydra_core::HydraResult;

use crate::entity::{Entity, ParentRef};

const MAX_TREE_DEPTH: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct TreeNode {
    pub entity: Entity,
    pub parent: Option<NodeId>,
    /// Child nodes grouped by collection name: the child entity name, with
    /// `:<column>` appended when the child table links here more than once.
    pub children: BTreeMap<String, Vec<NodeId>>,
    depth: usize,
}

#[derive(Clone, Debug)]
pub struct EntityTree {
    nodes: Vec<TreeNode>,
}

impl EntityTree {
    fn new(root: Entity) -> Self {
        Self {
            nodes: vec![TreeNode {
                entity: root,
                parent: None,
                children: BTreeMap::new(),
                depth: 0,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn entity(&self, id: NodeId) -> &Entity {
        &self.nodes[id.0].entity
    }

    pub fn entity_mut(&mut self, id: NodeId) -> &mut Entity {
        &mut self.nodes[id.0].entity
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId, collection: &str) -> &[NodeId] {
        self.nodes[id.0]
            .children
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn collections(&self, id: NodeId) -> impl Iterator<Item = &str> {
        self.nodes[id.0].children.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in load order; every parent precedes its children.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    pub fn into_root(mut self) -> Entity {
        self.nodes.swap_remove(0).entity
    }

    fn push(&mut self, parent: NodeId, collection: String, entity: Entity) -> NodeId {
        let id = NodeId(self.nodes.len());
        let depth = self.nodes[parent.0].depth + 1;
        self.nodes.push(TreeNode {
            entity,
            parent: Some(parent),
            children: BTreeMap::new(),
            depth,
        });
        self.nodes[parent.0]
            .children
            .entry(collection)
            .or_default()
            .push(id);
        id
    }

    pub async fn save_all<C: ConnectionTrait>(&mut self, conn: &C) -> HydraResult<()> {
        for node in &mut self.nodes {
            node.entity.save(conn).await?;
        }
        Ok(())
    }
}

/// Loads `root` and then, level by level, every child row reachable over
/// foreign keys that the registry places under its parent.
pub(crate) async fn load_tree<C: ConnectionTrait>(
    conn: &C,
    mut root: Entity,
) -> HydraResult<Option<EntityTree>> {
    if !root.load(conn).await? {
        return Ok(None);
    }
    let schema = root.schema().clone();
    let catalog = schema.catalog();
    let hierarchy = schema.hierarchy();
    let mut tree = EntityTree::new(root);
    let mut queue = VecDeque::from([tree.root()]);

    while let Some(id) = queue.pop_front() {
        let node = tree.node(id);
        if node.depth >= MAX_TREE_DEPTH {
            warn!(
                "stopping tree load below '{}' at depth {}",
                node.entity.entity_name(),
                node.depth
            );
            continue;
        }
        let parent_entity = node.entity.entity_name().to_string();
        let parent_table = node.entity.record().table_name().to_string();
        let links = catalog.children_of(&parent_table);
        let mut loaded = Vec::new();
        for link in links {
            let Some(child_entity) = hierarchy.entity_for_table(&link.child_table) else {
                warn!(
                    "skipping unregistered table '{}' under '{parent_entity}'",
                    link.child_table
                );
                continue;
            };
            if let Some(owner) = hierarchy.parent_of(child_entity)?
                && owner != parent_entity
            {
                debug!("'{child_entity}' belongs under '{owner}', not '{parent_entity}'");
                continue;
            }
            let Some(value) = tree.entity(id).get(&link.referenced_column)? else {
                continue;
            };
            let shared = links
                .iter()
                .filter(|other| other.child_table == link.child_table)
                .count()
                > 1;
            let collection = if shared {
                format!("{child_entity}:{}", link.column)
            } else {
                child_entity.to_string()
            };
            let template = schema.record_for(child_entity)?;
            let mut order_by = vec![link.column.clone()];
            order_by.extend(
                template
                    .primary_key()
                    .iter()
                    .filter(|column| **column != link.column)
                    .cloned(),
            );
            let records = template
                .select_where(conn, &[(link.column.clone(), value.clone())], &order_by)
                .await?;
            for record in records {
                let parent = ParentRef {
                    entity_name: parent_entity.clone(),
                    key: vec![(link.referenced_column.clone(), value.clone())],
                };
                loaded.push((
                    collection.clone(),
                    Entity::from_loaded(&schema, child_entity, record, Some(parent)),
                ));
            }
        }
        for (collection, entity) in loaded {
            let child = tree.push(id, collection, entity);
            queue.push_back(child);
        }
    }
    Ok(Some(tree))
}
