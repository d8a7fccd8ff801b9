use serde_json::json;

pub struct ContainerSize {
    pub count: usize,
    pub element_size: usize,
}

pub struct Leaf {
    pub name: String,
    pub info: ContainerSize,
}

pub struct Node {
    pub name: String,
    pub children: ContainerInfo,
}

pub enum ContainerInfoEntry {
    Leaf(Leaf),
    Node(Node),
}

impl ContainerInfoEntry {
    fn name(&self) -> &str {
        match self {
            ContainerInfoEntry::Leaf(leaf) => &leaf.name,
            ContainerInfoEntry::Node(node) => &node.name,
        }
    }

    fn into_json(self) -> (String, serde_json::Value) {
        match self {
            ContainerInfoEntry::Leaf(leaf) => (
                leaf.name,
                json!({
                    "count": leaf.info.count.to_string(),
                    "size": leaf.info.element_size.to_string()
                }),
            ),
            ContainerInfoEntry::Node(node) => (node.name, node.children.into_json()),
        }
    }
}

/// Memory usage report of the containers a component owns
pub struct ContainerInfo(Vec<ContainerInfoEntry>);

impl ContainerInfo {
    pub fn builder() -> ContainerInfosBuilder {
        ContainerInfosBuilder(Vec::new())
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.name()).collect()
    }

    /// Element count of the leaf called `name`, searching nested nodes as well
    pub fn count(&self, name: &str) -> Option<usize> {
        self.0.iter().find_map(|entry| match entry {
            ContainerInfoEntry::Leaf(leaf) if leaf.name == name => Some(leaf.info.count),
            ContainerInfoEntry::Leaf(_) => None,
            ContainerInfoEntry::Node(node) => node.children.count(name),
        })
    }

    pub fn into_json(self) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        for entry in self.0 {
            let (name, value) = entry.into_json();
            data.insert(name, value);
        }
        serde_json::Value::Object(data)
    }
}

pub struct ContainerInfosBuilder(Vec<ContainerInfoEntry>);

impl ContainerInfosBuilder {
    pub fn leaf(mut self, name: impl Into<String>, count: usize, element_size: usize) -> Self {
        self.0.push(ContainerInfoEntry::Leaf(Leaf {
            name: name.into(),
            info: ContainerSize {
                count,
                element_size,
            },
        }));
        self
    }

    pub fn node(mut self, name: impl Into<String>, infos: ContainerInfo) -> Self {
        self.0.push(ContainerInfoEntry::Node(Node {
            name: name.into(),
            children: infos,
        }));
        self
    }

    pub fn finish(self) -> ContainerInfo {
        ContainerInfo(self.0)
    }
}

impl<const N: usize> From<[(&'static str, usize, usize); N]> for ContainerInfo {
    fn from(value: [(&'static str, usize, usize); N]) -> Self {
        let mut builder = ContainerInfo::builder();
        for (name, count, element_size) in value {
            builder = builder.leaf(name, count, element_size);
        }
        builder.finish()
    }
}
