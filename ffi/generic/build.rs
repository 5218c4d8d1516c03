use std::env;

use cbindgen::{Builder, Config};

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();

    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    Builder::new()
        .with_src(format!("{crate_dir}/src/lib.rs"))
        .with_config(Config::from_file(format!("{crate_dir}/cbindgen.toml")).unwrap())
        .generate()
        .expect("Unable to generate bindings")
        .write_to_file(format!("{crate_dir}/bindings.h"));
}
