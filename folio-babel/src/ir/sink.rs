//! Per-parse collector that stamps element order and gathers warnings.

use super::elements::{IntermediateElement, Warning, WarningKind};
use tracing::warn;

/// Collects elements in emission order.
///
/// Parsers build elements with `order: 0` and hand them to [`ElementSink::emit`],
/// which assigns the next sequence number. The sink is owned by a single
/// parse call; nothing here is shared between documents.
#[derive(Debug, Default)]
pub struct ElementSink {
    elements: Vec<IntermediateElement>,
    warnings: Vec<Warning>,
}

impl ElementSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element, stamping its order. Returns the assigned order.
    pub fn emit(&mut self, mut element: IntermediateElement) -> usize {
        let order = self.elements.len();
        element.set_order(order);
        self.elements.push(element);
        order
    }

    /// Index the next emitted element will receive.
    pub fn next_index(&self) -> usize {
        self.elements.len()
    }

    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        let warning = Warning::new(kind, message).at(self.next_index());
        self.push_warning(warning);
    }

    pub fn push_warning(&mut self, warning: Warning) {
        warn!(kind = ?warning.kind, index = ?warning.element_index, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn elements(&self) -> &[IntermediateElement] {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut [IntermediateElement] {
        &mut self.elements
    }

    pub fn into_parts(self) -> (Vec<IntermediateElement>, Vec<Warning>) {
        (self.elements, self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::elements::PageBreak;

    #[test]
    fn emit_assigns_strictly_increasing_order() {
        let mut sink = ElementSink::new();
        for _ in 0..3 {
            sink.emit(IntermediateElement::PageBreak(PageBreak { order: 99 }));
        }
        let (elements, _) = sink.into_parts();
        let orders: Vec<usize> = elements.iter().map(|e| e.order()).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn warnings_point_at_the_next_element() {
        let mut sink = ElementSink::new();
        sink.emit(IntermediateElement::PageBreak(PageBreak { order: 0 }));
        sink.warn(WarningKind::UnsupportedElement, "skipped");
        let (_, warnings) = sink.into_parts();
        assert_eq!(warnings[0].element_index, Some(1));
    }
}
