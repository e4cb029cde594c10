use argh::FromArgs;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3333;

#[derive(FromArgs)]
/// Ask a running infernum-detect server what it sees in a remote image
struct ClientArgs {
    /// the host to connect to
    #[argh(option, default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// URL of the JPEG to analyze
    #[argh(positional)]
    image_url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let response = client
        .get(format!("http://{}/p/", addr))
        .query(&[("img", args.image_url.as_str())])
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        println!("Server answered {}: {}", status, body);
        return Ok(());
    }

    let result: serde_json::Value = serde_json::from_str(&body)?;
    println!("Result: {}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
