//! Arena tree of target paths.
//!
//! Interior nodes are the containers named by target paths; leaves are byte
//! ranges in one of the two input buffers. Nothing is decoded: a leaf is
//! copied verbatim when the tree is written out.

use brook_cbor::token::{self, Major};
use brook_cbor::writer::{write_array_header, write_map_header, write_text};
use brook_cbor::ValueSpan;
use indexmap::IndexMap;

use crate::target::{PathSegment, TargetPath};
use crate::MappingError;

pub(crate) type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Buffer {
    /// The document mappings read from.
    Source,
    /// The document mapped values are merged into.
    Base,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Leaf {
    pub buffer: Buffer,
    pub span: ValueSpan,
}

#[derive(Debug)]
enum Node {
    Object(IndexMap<String, NodeId>),
    Array(Vec<NodeId>),
    Leaf(Leaf),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Buffers<'a> {
    pub source: &'a [u8],
    pub base: &'a [u8],
}

impl<'a> Buffers<'a> {
    fn get(&self, buffer: Buffer) -> &'a [u8] {
        match buffer {
            Buffer::Source => self.source,
            Buffer::Base => self.base,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MappingTree {
    nodes: Vec<Node>,
}

impl MappingTree {
    pub fn reset_empty(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::Object(IndexMap::new()));
    }

    pub fn reset_with(&mut self, root: Leaf) {
        self.nodes.clear();
        self.nodes.push(Node::Leaf(root));
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn set_leaf(
        &mut self,
        target: &TargetPath,
        leaf: Leaf,
        buffers: &Buffers<'_>,
    ) -> Result<(), MappingError> {
        let id = self.resolve(target, buffers)?;
        self.nodes[id] = Node::Leaf(leaf);
        Ok(())
    }

    pub fn write(&self, buffers: &Buffers<'_>, out: &mut Vec<u8>) -> Result<(), MappingError> {
        if let Some(Node::Leaf(leaf)) = self.nodes.get(ROOT) {
            let buf = buffers.get(leaf.buffer);
            let offset = token::skip_tags(buf, leaf.span.start())?;
            if token::read_header(buf, offset)?.major != Major::Map {
                return Err(MappingError::NonMapResult);
            }
        }
        self.write_node(ROOT, buffers, out)
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Walks `target` from the root, creating missing containers and
    /// replacing nodes of the wrong kind. Returns the node the path names.
    fn resolve(&mut self, target: &TargetPath, buffers: &Buffers<'_>) -> Result<NodeId, MappingError> {
        let mut current = ROOT;
        for segment in target.segments() {
            self.expand(current, buffers)?;
            current = match segment {
                PathSegment::Field(name) => self.field_child(current, name),
                PathSegment::Index(index) => self.array_child(current, *index, target)?,
            };
        }
        Ok(current)
    }

    fn field_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        if !matches!(self.nodes[parent], Node::Object(_)) {
            self.nodes[parent] = Node::Object(IndexMap::new());
        }
        if let Node::Object(children) = &self.nodes[parent] {
            if let Some(child) = children.get(name) {
                return *child;
            }
        }
        let child = self.alloc(Node::Object(IndexMap::new()));
        if let Node::Object(children) = &mut self.nodes[parent] {
            children.insert(name.to_string(), child);
        }
        child
    }

    fn array_child(
        &mut self,
        parent: NodeId,
        index: usize,
        target: &TargetPath,
    ) -> Result<NodeId, MappingError> {
        if !matches!(self.nodes[parent], Node::Array(_)) {
            self.nodes[parent] = Node::Array(Vec::new());
        }
        let len = match &self.nodes[parent] {
            Node::Array(items) => {
                if let Some(child) = items.get(index) {
                    return Ok(*child);
                }
                items.len()
            }
            _ => 0,
        };
        if index > len {
            return Err(MappingError::IndexOutOfRange {
                target: target.expression().to_string(),
                index,
                len,
            });
        }
        let child = self.alloc(Node::Object(IndexMap::new()));
        if let Node::Array(items) = &mut self.nodes[parent] {
            items.push(child);
        }
        Ok(child)
    }

    /// Turns a leaf holding an encoded map or array into a container of
    /// leaves over the same buffer. Other nodes are left untouched.
    fn expand(&mut self, id: NodeId, buffers: &Buffers<'_>) -> Result<(), MappingError> {
        let leaf = match &self.nodes[id] {
            Node::Leaf(leaf) => *leaf,
            _ => return Ok(()),
        };
        let buf = buffers.get(leaf.buffer);
        let offset = token::skip_tags(buf, leaf.span.start())?;
        match token::read_header(buf, offset)?.major {
            Major::Map => {
                let mut children = IndexMap::new();
                for entry in token::map_entries(buf, offset)? {
                    let (key, _) = token::read_text(buf, entry.key)?
                        .ok_or(MappingError::NonTextKey { offset: entry.key })?;
                    let span = ValueSpan::new(entry.value, entry.end)?;
                    let child = self.alloc(Node::Leaf(Leaf {
                        buffer: leaf.buffer,
                        span,
                    }));
                    children.insert(key.to_string(), child);
                }
                self.nodes[id] = Node::Object(children);
            }
            Major::Array => {
                let mut items = Vec::new();
                for item in token::array_items(buf, offset)? {
                    let span = token::value_span(buf, item)?;
                    items.push(self.alloc(Node::Leaf(Leaf {
                        buffer: leaf.buffer,
                        span,
                    })));
                }
                self.nodes[id] = Node::Array(items);
            }
            _ => {}
        }
        Ok(())
    }

    fn write_node(
        &self,
        id: NodeId,
        buffers: &Buffers<'_>,
        out: &mut Vec<u8>,
    ) -> Result<(), MappingError> {
        match &self.nodes[id] {
            Node::Object(children) => {
                write_map_header(out, children.len());
                for (name, child) in children {
                    write_text(out, name);
                    self.write_node(*child, buffers, out)?;
                }
            }
            Node::Array(items) => {
                write_array_header(out, items.len());
                for item in items {
                    self.write_node(*item, buffers, out)?;
                }
            }
            Node::Leaf(leaf) => {
                out.extend_from_slice(leaf.span.slice(buffers.get(leaf.buffer))?);
            }
        }
        Ok(())
    }
}
