use crate::simulation::id::Id;
use nohash_hasher::{IntMap, IntSet};

pub mod capacity;
pub mod flow_cap;
pub mod holes;
pub mod link;
pub mod signal;
pub mod sim_network;
pub mod storage_cap;
pub mod vehicle_q;

/// Static road network. Nodes and links are kept in insertion order, which is the order the
/// simulation network is built in.
#[derive(Debug)]
pub struct Network {
    nodes: Vec<Node>,
    links: Vec<Link>,
    node_index: IntMap<Id<Node>, usize>,
    link_index: IntMap<Id<Link>, usize>,
    pub effective_cell_size: f64,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: Id<Node>,
    pub in_links: Vec<Id<Link>>,
    pub out_links: Vec<Id<Link>>,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: Id<Link>,
    pub from: Id<Node>,
    pub to: Id<Node>,
    /// metres
    pub length: f64,
    /// vehicles per hour
    pub capacity: f64,
    /// metres per second
    pub freespeed: f64,
    pub permlanes: f64,
    pub modes: IntSet<Id<String>>,
}

impl Default for Network {
    fn default() -> Self {
        Network::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Network {
            nodes: Vec::new(),
            links: Vec::new(),
            node_index: IntMap::default(),
            link_index: IntMap::default(),
            effective_cell_size: 7.5,
        }
    }

    pub fn add_node(&mut self, node: Node) {
        assert!(
            !self.node_index.contains_key(&node.id),
            "Node with id {} already exists in the network.",
            node.id
        );
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    /// Adds a link and registers it as out link of its from node and in link of its to node.
    /// Both nodes must have been added before.
    pub fn add_link(&mut self, link: Link) {
        assert!(
            !self.link_index.contains_key(&link.id),
            "Link with id {} already exists in the network.",
            link.id
        );
        let from = self.node_position(&link.from, &link.id);
        self.nodes[from].out_links.push(link.id.clone());
        let to = self.node_position(&link.to, &link.id);
        self.nodes[to].in_links.push(link.id.clone());

        self.link_index.insert(link.id.clone(), self.links.len());
        self.links.push(link);
    }

    fn node_position(&self, node_id: &Id<Node>, link_id: &Id<Link>) -> usize {
        *self.node_index.get(node_id).unwrap_or_else(|| {
            panic!("Node {node_id} of link {link_id} must be added to the network before the link.")
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn get_node(&self, id: &Id<Node>) -> &Node {
        self.try_get_node(id)
            .unwrap_or_else(|| panic!("Node {id} is not part of the network."))
    }

    pub fn try_get_node(&self, id: &Id<Node>) -> Option<&Node> {
        self.node_index.get(id).map(|i| &self.nodes[*i])
    }

    pub fn get_link(&self, id: &Id<Link>) -> &Link {
        self.try_get_link(id)
            .unwrap_or_else(|| panic!("Link {id} is not part of the network."))
    }

    pub fn try_get_link(&self, id: &Id<Link>) -> Option<&Link> {
        self.link_index.get(id).map(|i| &self.links[*i])
    }
}

impl Node {
    pub fn new(id: Id<Node>) -> Self {
        Node {
            id,
            in_links: Vec::new(),
            out_links: Vec::new(),
        }
    }
}

impl Link {
    pub fn new_with_default(id: Id<Link>, from: Id<Node>, to: Id<Node>) -> Self {
        Link {
            id,
            from,
            to,
            length: 1.0,
            capacity: 1.0,
            freespeed: 1.0,
            permlanes: 1.0,
            modes: IntSet::default(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Id<Link>,
        from: Id<Node>,
        to: Id<Node>,
        length: f64,
        capacity: f64,
        freespeed: f64,
        permlanes: f64,
        modes: IntSet<Id<String>>,
    ) -> Self {
        Link {
            id,
            from,
            to,
            length,
            capacity,
            freespeed,
            permlanes,
            modes,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::id::Id;
    use crate::simulation::network::{Link, Network, Node};
    use macros::integration_test;

    #[integration_test]
    fn add_link_wires_nodes() {
        let mut network = Network::new();
        network.add_node(Node::new(Id::create("n1")));
        network.add_node(Node::new(Id::create("n2")));
        network.add_link(Link::new_with_default(
            Id::create("l1"),
            Id::create("n1"),
            Id::create("n2"),
        ));

        let from = network.get_node(&Id::create("n1"));
        assert_eq!(vec![Id::create("l1")], from.out_links);
        assert!(from.in_links.is_empty());
        let to = network.get_node(&Id::create("n2"));
        assert_eq!(vec![Id::<Link>::create("l1")], to.in_links);
        assert_eq!(1, network.links().len());
        assert!(network.try_get_link(&Id::create("other")).is_none());
    }

    #[integration_test]
    #[should_panic]
    fn add_link_without_nodes() {
        let mut network = Network::new();
        network.add_link(Link::new_with_default(
            Id::create("l1"),
            Id::create("n1"),
            Id::create("n2"),
        ));
    }
}
