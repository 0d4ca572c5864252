use argon2::{Variant, Version};
use derive_more::{Deref, Display};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;

pub mod repository;

pub const PASSWORD_LENGTH: u32 = 64;
pub const MIN_PASSWORD_LENGTH: u32 = 5;
pub const DEFAULT_ARGON_CONFIG: argon2::Config = argon2::Config {
    variant: Variant::Argon2i,
    version: Version::Version13,
    mem_cost: 65535,
    time_cost: 10,
    lanes: 4,
    secret: &[],
    ad: &[],
    hash_length: PASSWORD_LENGTH,
};

pub type Salt = [u8; 64];

pub fn generate_salt() -> Salt {
    let mut salt = [0; 64];
    StdRng::from_entropy().fill_bytes(&mut salt);
    salt
}

#[derive(
    Deref, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display,
)]
pub struct Login(pub String);

#[derive(Id, Debug, Clone)]
#[Id(ref_id, get_id)]
pub struct UserCredentials {
    #[id]
    pub login: Login,
    pub password: Password,
    pub access: BTreeSet<Access>,
}

impl UserCredentials {
    /// Capability required for the control panel: options, imports and the product list
    pub fn can_manage_options(&self) -> bool {
        self.access.iter().any(|a| matches!(a, Access::ControlPanel))
    }
}

#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize, Display)]
pub enum Access {
    ControlPanel,
}

impl TryFrom<String> for Access {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s {
            x if x == Self::ControlPanel.to_string() => Ok(Self::ControlPanel),
            x => Err(x),
        }
    }
}

#[derive(Clone, Debug, Deref, PartialEq)]
pub struct Password {
    #[deref]
    password: String,
    salt: Salt,
}

impl Password {
    pub fn new(password: String, salt: Salt) -> Result<Password, anyhow::Error> {
        if password.is_empty() {
            return Err(anyhow::anyhow!("Password hash cannot be empty"));
        }
        Ok(Self { password, salt })
    }
    pub fn check(&self, input: &str) -> Result<bool, anyhow::Error> {
        Ok(argon2::verify_encoded(&self.password, input.as_bytes())?)
    }
    pub fn generate(input: String, salt: Salt) -> Result<Password, anyhow::Error> {
        Self::generate_with(input, salt, &DEFAULT_ARGON_CONFIG)
    }
    pub fn generate_with(
        input: String,
        salt: Salt,
        config: &argon2::Config,
    ) -> Result<Password, anyhow::Error> {
        if input.len() < MIN_PASSWORD_LENGTH as usize {
            return Err(anyhow::anyhow!(
                "Password cannot be shorter than {MIN_PASSWORD_LENGTH}"
            ));
        }
        let password = argon2::hash_encoded(input.as_bytes(), &salt, config)?;
        Ok(Self { password, salt })
    }
    pub fn salt(&self) -> &Salt {
        &self.salt
    }
    pub fn password(&self) -> &String {
        &self.password
    }
}
