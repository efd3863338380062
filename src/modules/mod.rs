// Module exports for the tab tree
pub mod tree_builder;       // Opener forest construction (pure logic)
pub mod view;               // Retained element tree + patches
pub mod renderer;           // Incremental reconciliation
pub mod tab_service;        // Host capabilities and tab actions
pub mod registry;           // In-process tab model
pub mod panel;              // Composition root
