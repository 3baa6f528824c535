use wit_socket::run;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    run()?;
    Ok(())
}
