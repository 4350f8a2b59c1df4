#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Shared configuration types for the apkforge package emission core

mod config;

pub use config::{
    Configuration, Copyright, Dependencies, Package, PackageOptions, Scriptlets, Subpackage,
    TriggerScriptlet,
};
