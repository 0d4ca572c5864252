use crate::access::UserCredentials;
use typesafe_repository::async_ops::{Get, List, Save};
use typesafe_repository::Repository;

pub trait UserCredentialsRepository:
    Repository<UserCredentials, Error = anyhow::Error>
    + Get<UserCredentials>
    + List<UserCredentials>
    + Save<UserCredentials>
    + Send
    + Sync
{
}
