use crate::parser::ctype::{CType, FuncSig};

use super::Block;

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ctype: CType,
}

/// A top-level function prototype (`body: None`) or definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub sig: FuncSig,
    pub params: Vec<Param>,
    pub body: Option<Block>,
}

/// A translation unit: the ordered list of top-level functions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ast {
    nodes: Vec<Function>,
}

impl Ast {
    pub fn from_nodes(nodes: Vec<Function>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Function] {
        &self.nodes
    }
}
