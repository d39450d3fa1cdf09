use std::str::FromStr;

use ethers::signers::LocalWallet;
use ethers::types::H256;
use serde::Deserialize;

/// PrivateKey represents a secp256k1 private key.
#[derive(Clone)]
pub struct PrivateKey(H256);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<H256> for PrivateKey {
    fn from(secret: H256) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = H256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PrivateKey {
    /// Builds a local wallet out of this key.
    pub fn to_wallet(&self) -> webb_relayer_utils::Result<LocalWallet> {
        Ok(LocalWallet::from_bytes(self.0.as_bytes())?)
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = H256;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value.starts_with("0x") {
                    // hex value
                    let maybe_hex = H256::from_str(value);
                    match maybe_hex {
                        Ok(val) => Ok(val),
                        Err(e) => Err(serde::de::Error::custom(format!("{e}\n got {} but expected a 66 string (including the 0x prefix)", value.len()))),
                    }
                } else if value.starts_with('$') {
                    // env
                    let var = value.strip_prefix('$').unwrap_or(value);
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {}: {}",
                            var, e,
                        ))
                    })?;
                    let maybe_hex = H256::from_str(&val);
                    match maybe_hex {
                        Ok(val) => Ok(val),
                        Err(e) => Err(serde::de::Error::custom(format!("{e}\n expected a 66 chars string (including the 0x prefix) but found {} char",  val.len()))),
                    }
                } else {
                    Err(serde::de::Error::custom(
                        "expected a 0x prefixed hex string or a $ENV_VAR",
                    ))
                }
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVistor)?;
        Ok(Self(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        key: PrivateKey,
    }

    #[test]
    fn parses_hex_and_env() {
        let hex_key =
            "0x8917174396171783496173419137618235192359106130478137647163400318";
        let parsed: Holder =
            serde_json::from_str(&format!(r#"{{"key":"{hex_key}"}}"#)).unwrap();
        assert_eq!(format!("{:?}", *parsed.key), hex_key);
        assert!(parsed.key.to_wallet().is_ok());

        std::env::set_var("RELAYER_TEST_TSS_KEY", hex_key);
        let from_env: Holder =
            serde_json::from_str(r#"{"key":"$RELAYER_TEST_TSS_KEY"}"#).unwrap();
        assert_eq!(*from_env.key, *parsed.key);
    }

    #[test]
    fn rejects_plain_words() {
        let res: Result<Holder, _> =
            serde_json::from_str(r#"{"key":"word word word"}"#);
        assert!(res.is_err());
    }
}
