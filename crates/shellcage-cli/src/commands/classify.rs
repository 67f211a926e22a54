use anyhow::{Context, Result};
use serde::Serialize;
use shellcage_sandbox::{AddressClass, classify};

use crate::output::{OutputFormat, print_json};

#[derive(Debug, Serialize)]
struct Classification {
    address: String,
    loopback: bool,
    family: Option<String>,
}

pub fn run(addresses: &[String], format: OutputFormat) -> Result<()> {
    let mut results = Vec::with_capacity(addresses.len());
    for address in addresses {
        let class = classify(address).with_context(|| format!("Cannot classify '{address}'"))?;
        results.push((address, class));
    }

    if format.is_json() {
        let rows: Vec<Classification> = results
            .iter()
            .map(|(address, class)| Classification {
                address: address.to_string(),
                loopback: class.is_loopback(),
                family: match class {
                    AddressClass::Loopback(family) => Some(family.to_string()),
                    AddressClass::Restricted => None,
                },
            })
            .collect();
        return print_json(&rows);
    }

    for (address, class) in results {
        println!("{address}\t{class}");
    }
    Ok(())
}
