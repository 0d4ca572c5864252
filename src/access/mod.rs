use rand::distributions::Alphanumeric;
use rand::Rng;
use shop_types::access::repository::UserCredentialsRepository;
use shop_types::access::{generate_salt, Access, Login, Password, UserCredentials};
use std::collections::BTreeSet;
use typesafe_repository::async_ops::{Get, Save};

pub mod controllers;
pub mod repository;

const GENERATED_PASSWORD_LENGTH: usize = 16;

/// Creates the administrator account on first start. An existing account is left as is.
pub async fn ensure_admin(
    repo: &dyn UserCredentialsRepository,
    login: &str,
    password: Option<String>,
    argon: &argon2::Config<'_>,
) -> Result<(), anyhow::Error> {
    let login = Login(login.to_string());
    if repo.get_one(&login).await?.is_some() {
        return Ok(());
    }
    let password = match password {
        Some(p) => p,
        None => {
            let p = rand::thread_rng()
                .sample_iter(Alphanumeric)
                .take(GENERATED_PASSWORD_LENGTH)
                .map(char::from)
                .collect::<String>();
            log::warn!("ADMIN_PASSWORD is not set, generated password for {login}: {p}");
            p
        }
    };
    let password = Password::generate_with(password, generate_salt(), argon)?;
    repo.save(UserCredentials {
        login: login.clone(),
        password,
        access: BTreeSet::from([Access::ControlPanel]),
    })
    .await?;
    log::info!("Created administrator {login}");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::repository::SqliteUserCredentialsRepository;
    use super::*;
    use argon2::{Variant, Version};
    use tokio_rusqlite::Connection;
    use typesafe_repository::async_ops::List;

    pub const FAST_ARGON: argon2::Config = argon2::Config {
        variant: Variant::Argon2i,
        version: Version::Version13,
        mem_cost: 64,
        time_cost: 1,
        lanes: 1,
        secret: &[],
        ad: &[],
        hash_length: 32,
    };

    #[tokio::test]
    async fn admin_is_created_once() {
        let conn = Connection::open_in_memory().await.expect("conn");
        let repo = SqliteUserCredentialsRepository::init(conn).await.expect("init");
        ensure_admin(&repo, "admin", Some("first-pass".into()), &FAST_ARGON)
            .await
            .expect("create");
        ensure_admin(&repo, "admin", Some("second-pass".into()), &FAST_ARGON)
            .await
            .expect("keep");
        let users = repo.list().await.expect("list");
        assert_eq!(users.len(), 1);
        let admin = &users[0];
        assert_eq!(admin.login, Login("admin".into()));
        assert!(admin.can_manage_options());
        assert!(admin.password.check("first-pass").expect("verify"));
        assert!(!admin.password.check("second-pass").expect("verify"));
    }

    #[tokio::test]
    async fn missing_password_is_generated() {
        let conn = Connection::open_in_memory().await.expect("conn");
        let repo = SqliteUserCredentialsRepository::init(conn).await.expect("init");
        ensure_admin(&repo, "root", None, &FAST_ARGON)
            .await
            .expect("create");
        let admin = repo
            .get_one(&Login("root".into()))
            .await
            .expect("get")
            .expect("admin");
        assert_eq!(admin.password.salt().len(), 64);
    }
}
