use crate::SqlWrapper;
use async_trait::async_trait;
use rusqlite::params;
use rusqlite::types::Type;
use shop_types::access::repository::UserCredentialsRepository;
use shop_types::access::{Access, Login, Password, Salt, UserCredentials};
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Get, List, Save};
use typesafe_repository::{IdentityOf, Repository};

pub struct SqliteUserCredentialsRepository {
    conn: Connection,
}

impl SqliteUserCredentialsRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS user (
                    login TEXT PRIMARY KEY,
                    password TEXT NOT NULL,
                    salt BLOB NOT NULL,
                    access TEXT NOT NULL
                )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

impl Repository<UserCredentials> for SqliteUserCredentialsRepository {
    type Error = anyhow::Error;
}

impl TryFrom<&rusqlite::Row<'_>> for SqlWrapper<UserCredentials> {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'_>) -> Result<Self, Self::Error> {
        let invalid = |idx: usize, err: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, err.into())
        };
        let salt: Salt = row
            .get::<_, Vec<u8>>(2)?
            .try_into()
            .map_err(|v: Vec<u8>| invalid(2, anyhow::anyhow!("Invalid salt length {}", v.len())))?;
        let password = Password::new(row.get(1)?, salt).map_err(|err| invalid(1, err))?;
        let access = row
            .get::<_, String>(3)?
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| Access::try_from(s.to_string()))
            .collect::<Result<_, _>>()
            .map_err(|s| invalid(3, anyhow::anyhow!("Invalid access entry: {s}")))?;
        Ok(SqlWrapper(UserCredentials {
            login: Login(row.get(0)?),
            password,
            access,
        }))
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserCredentials> {
    SqlWrapper::<UserCredentials>::try_from(row).map(SqlWrapper::into_inner)
}

#[async_trait]
impl Get<UserCredentials> for SqliteUserCredentialsRepository {
    async fn get_one(
        &self,
        id: &IdentityOf<UserCredentials>,
    ) -> Result<Option<UserCredentials>, Self::Error> {
        let login = id.0.clone();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT login, password, salt, access FROM user WHERE login = ?1")?;
                let u = stmt.query_map([login], row_to_user)?.next().transpose()?;
                Ok(u)
            })
            .await?)
    }
}

#[async_trait]
impl List<UserCredentials> for SqliteUserCredentialsRepository {
    async fn list(&self) -> Result<Vec<UserCredentials>, Self::Error> {
        Ok(self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT login, password, salt, access FROM user ORDER BY login")?;
                let u = stmt
                    .query_map([], row_to_user)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(u)
            })
            .await?)
    }
}

#[async_trait]
impl Save<UserCredentials> for SqliteUserCredentialsRepository {
    async fn save(&self, user: UserCredentials) -> Result<(), Self::Error> {
        let access = user
            .access
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Ok(self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO user (login, password, salt, access) VALUES (?1, ?2, ?3, ?4) ON CONFLICT(login) DO UPDATE SET password = ?2, salt = ?3, access = ?4",
                    params![
                        user.login.0,
                        user.password.password(),
                        &user.password.salt()[..],
                        access,
                    ],
                )?;
                Ok(())
            })
            .await?)
    }
}

impl UserCredentialsRepository for SqliteUserCredentialsRepository {}
