fn main() -> anyhow::Result<()> {
	println!("cargo:rerun-if-changed=proto/opamp.proto");
	let file_descriptors = protox::compile(["proto/opamp.proto"], ["proto"])?;
	prost_build::Config::new().compile_fds(file_descriptors)?;
	Ok(())
}
