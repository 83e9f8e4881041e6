//! # CRD Generator
//!
//! Prints the GSLBConfig, GlobalDeploymentPolicy and GSLBHostRule
//! CustomResourceDefinitions as a multi-document YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use gslb_controller::crd::{GlobalDeploymentPolicy, GslbConfig, GslbHostRule};
use kube::core::CustomResourceExt;

fn main() {
    let crds = [GslbConfig::crd(), GlobalDeploymentPolicy::crd(), GslbHostRule::crd()];

    for crd in &crds {
        match serde_yaml::to_string(crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}
