// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates Kubernetes CRD YAML files from Rust types defined in src/crd.rs.
//! This ensures the YAML files in deploy/crds/ are always in sync with the Rust code.
//!
//! Usage:
//!   cargo run --bin crdgen
//!
//! Generated files will be written to deploy/crds/ with proper headers.

use capc::crd::{
    CloudStackAffinityGroup, CloudStackCluster, CloudStackFailureDomain,
    CloudStackIsolatedNetwork, CloudStackMachine, CloudStackMachineStateChecker,
};
use kube::CustomResourceExt;
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = Path::new("deploy/crds");

    // Ensure output directory exists
    fs::create_dir_all(output_dir)?;

    println!("Generating CRD YAML files from src/crd.rs...");

    generate_crd::<CloudStackCluster>("cloudstackclusters.crd.yaml", output_dir)?;
    generate_crd::<CloudStackFailureDomain>("cloudstackfailuredomains.crd.yaml", output_dir)?;
    generate_crd::<CloudStackIsolatedNetwork>("cloudstackisolatednetworks.crd.yaml", output_dir)?;
    generate_crd::<CloudStackMachine>("cloudstackmachines.crd.yaml", output_dir)?;
    generate_crd::<CloudStackAffinityGroup>("cloudstackaffinitygroups.crd.yaml", output_dir)?;
    generate_crd::<CloudStackMachineStateChecker>(
        "cloudstackmachinestatecheckers.crd.yaml",
        output_dir,
    )?;

    println!("✓ Successfully generated CRD YAML files in deploy/crds/");
    println!("\nNext steps:");
    println!("  1. Review the generated files");
    println!("  2. Deploy with: kubectl apply -f deploy/crds/");

    Ok(())
}

fn generate_crd<T>(filename: &str, output_dir: &Path) -> Result<(), Box<dyn std::error::Error>>
where
    T: CustomResourceExt,
{
    let crd = T::crd();
    let yaml = serde_yaml::to_string(&crd)?;

    let path = output_dir.join(filename);
    fs::write(&path, format!("{COPYRIGHT_HEADER}{yaml}"))?;
    println!("  wrote {}", path.display());
    Ok(())
}
