//! trellis: a component-oriented, server-side page framework
//!
//! A page is a tree of components assembled once from a template and kept
//! in a pool. Rendering drains a LIFO render queue; components publish
//! services to their subtree through a typed environment; forms record a
//! log of actions while rendering and replay it on submit; links encode
//! component events and page renders into URLs that the dispatchers decode
//! again.

pub mod app;
pub mod cli;
pub mod component;
pub mod config;
pub mod corelib;
pub mod demo;
pub mod dispatch;
pub mod form;
pub mod ids;
pub mod link;
pub mod logging;
pub mod markup;
pub mod page;
pub mod render;
pub mod request;
pub mod server;
pub mod startup;
