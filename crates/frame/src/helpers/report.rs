use crate::column::ColumnTypes;
use crate::node::Node;
use crate::nodes::ActionHelper;
use crate::report::CutFlowReport;
use quiver_core::Result;
use std::sync::Arc;

/// Collects the cut-flow of the named filters upstream of a node.
pub struct ReportHelper {
    node: Arc<dyn Node>,
}

impl ReportHelper {
    pub fn new(node: Arc<dyn Node>) -> Self {
        Self { node }
    }
}

impl ActionHelper<()> for ReportHelper {
    type Result = CutFlowReport;

    fn name(&self) -> &str {
        "Report"
    }

    fn exec<'a>(&self, _slot: usize, _values: <() as ColumnTypes>::Refs<'a>) -> Result<()> {
        Ok(())
    }

    fn finalize(&self) -> Result<CutFlowReport> {
        let mut report = CutFlowReport::new();
        self.node.report(&mut report);
        Ok(report)
    }
}
