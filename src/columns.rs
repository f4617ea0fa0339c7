use crate::frame::Frame;

/// One row of a column: either a decoded frame or an opaque byte buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Frame(Frame),
    Bytes(Vec<u8>),
}

impl Element {
    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Element::Frame(frame) => Some(frame),
            Element::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Element::Bytes(bytes) => Some(bytes),
            Element::Frame(_) => None,
        }
    }
}

/// Rows of a single column for one batch
pub type Column = Vec<Element>;

/// All columns of one batch, in the op's declared column order
pub type BatchedColumns = Vec<Column>;

pub fn num_rows(column: &Column) -> usize {
    column.len()
}

/// Appends a byte buffer as the next row of `column`
pub fn insert_element(column: &mut Column, bytes: Vec<u8>) {
    column.push(Element::Bytes(bytes));
}

pub fn insert_frame(column: &mut Column, frame: Frame) {
    column.push(Element::Frame(frame));
}
