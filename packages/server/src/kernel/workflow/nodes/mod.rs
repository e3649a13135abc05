//! Node families: fetch, scan, validate, compare, save, notify, monitor.
//!
//! Nodes receive their collaborators at construction through the factory;
//! business semantics stay in the node, infrastructure stays in the deps.

mod compare;
mod fetch;
mod monitor;
mod notify;
mod save;
mod scan;
mod validate;

pub use compare::CompareNode;
pub use fetch::FetchTargetsNode;
pub use monitor::MonitorNode;
pub use notify::NotifyNode;
pub use save::SaveNode;
pub use scan::ScanNode;
pub use validate::ValidateNode;

use std::sync::Arc;

use scanner::ScannerSet;

use super::factory::NodeFactory;
use crate::kernel::browser_pool::BrowserPool;
use crate::kernel::compare::ComparatorSet;
use crate::kernel::notify::Notifier;
use crate::kernel::reference::ReferenceStore;

/// Collaborators shared by the built-in node families.
pub struct NodeDeps {
    pub scanners: Arc<dyn ScannerSet>,
    pub pool: Arc<BrowserPool>,
    pub reference: Arc<dyn ReferenceStore>,
    pub notifier: Arc<dyn Notifier>,
    pub comparators: Arc<ComparatorSet>,
}

/// Shared-state key under which the worker parks the job's result writer.
pub const RESULT_WRITER_KEY: &str = "result_writer";

/// Build the factory with every built-in node family registered.
pub fn default_factory(deps: Arc<NodeDeps>) -> NodeFactory {
    let mut factory = NodeFactory::new();

    {
        let deps = deps.clone();
        factory.register("fetch", move |_| {
            Ok(Arc::new(FetchTargetsNode::new(deps.reference.clone())))
        });
    }
    {
        let deps = deps.clone();
        factory.register("scan", move |_| {
            Ok(Arc::new(ScanNode::new(
                deps.scanners.clone(),
                deps.pool.clone(),
            )))
        });
    }
    factory.register("validate", |_| Ok(Arc::new(ValidateNode)));
    {
        let deps = deps.clone();
        factory.register("compare", move |_| {
            Ok(Arc::new(CompareNode::new(
                deps.reference.clone(),
                deps.comparators.clone(),
            )))
        });
    }
    factory.register("save", |_| Ok(Arc::new(SaveNode)));
    {
        let deps = deps.clone();
        factory.register("notify", move |_| {
            Ok(Arc::new(NotifyNode::new(deps.notifier.clone())))
        });
    }
    {
        let deps = deps.clone();
        factory.register("monitor", move |_| {
            Ok(Arc::new(MonitorNode::new(
                deps.scanners.clone(),
                deps.pool.clone(),
            )))
        });
    }

    factory
}
