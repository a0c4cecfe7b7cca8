use anyhow::{bail, Context, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A JSON object holding request or response parameters, from which
/// [TypedParameters](TypedParameter) are read and into which they are written.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UntypedObject(pub(crate) Map<String, Json>);

/// A parameter with a fixed key and a typed value.
pub trait TypedParameter:
    TryFrom<Json, Error = anyhow::Error> + TryInto<Json> + Clone + std::fmt::Debug
{
    const KEY: &'static str;
}

impl UntypedObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a [TypedParameter], or `None` if the key is absent.
    ///
    /// Note that this method clones the underlying data.
    pub fn get<T: TypedParameter>(&self) -> Option<Result<T>> {
        Some(self.0.get(T::KEY)?.clone().try_into())
    }

    /// Get a [TypedParameter] or its default when absent.
    pub fn get_or_default<T: TypedParameter + Default>(&self) -> Result<T> {
        self.get().transpose().map(Option::unwrap_or_default)
    }

    pub fn remove<T: TypedParameter>(&mut self) -> Option<Result<T>> {
        Some(self.0.remove(T::KEY)?.try_into())
    }

    /// Insert a [TypedParameter], returning the raw value it replaced.
    pub fn insert<T: TypedParameter>(&mut self, t: T) -> Result<Option<Json>> {
        let Ok(value) = t.try_into() else {
            bail!("'{}' could not be serialized", T::KEY)
        };
        Ok(self.0.insert(T::KEY.to_owned(), value))
    }

    /// Insert a raw value under `key`.
    pub fn insert_raw(&mut self, key: &str, value: Json) -> Option<Json> {
        self.0.insert(key.to_owned(), value)
    }

    pub fn get_raw(&self, key: &str) -> Option<&Json> {
        self.0.get(key)
    }

    pub fn contains<T: TypedParameter>(&self) -> bool {
        self.0.contains_key(T::KEY)
    }

    pub fn as_map(&self) -> &Map<String, Json> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Json> {
        self.0
    }
}

impl From<UntypedObject> for Json {
    fn from(value: UntypedObject) -> Self {
        value.0.into()
    }
}

impl From<Map<String, Json>> for UntypedObject {
    fn from(value: Map<String, Json>) -> Self {
        Self(value)
    }
}

impl TryFrom<Json> for UntypedObject {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self> {
        match value {
            Json::Object(map) => Ok(Self(map)),
            other => bail!("expected a JSON object, found {other}"),
        }
    }
}

pub trait ParsingErrorContext {
    type T: TypedParameter;

    fn parsing_error(self) -> Result<Self::T>;
}

impl<T: TypedParameter> ParsingErrorContext for Option<Result<T>> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.context(format!("'{}' is missing", T::KEY))?
            .context(format!("'{}' could not be parsed", T::KEY))
    }
}

impl<T: TypedParameter> ParsingErrorContext for Result<T> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.context(format!("'{}' could not be parsed", T::KEY))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Scope(String);

    impl TypedParameter for Scope {
        const KEY: &'static str = "scope";
    }

    impl TryFrom<Json> for Scope {
        type Error = Error;

        fn try_from(value: Json) -> Result<Self> {
            Ok(Self(serde_json::from_value(value)?))
        }
    }

    impl From<Scope> for Json {
        fn from(value: Scope) -> Self {
            value.0.into()
        }
    }

    #[test]
    fn typed_access() {
        let mut object = UntypedObject::try_from(json!({"scope": "openid"})).unwrap();
        assert_eq!(object.get::<Scope>().unwrap().unwrap(), Scope("openid".into()));

        assert_eq!(
            object.insert(Scope("profile".into())).unwrap(),
            Some(json!("openid"))
        );
        assert_eq!(object.remove::<Scope>().unwrap().unwrap(), Scope("profile".into()));
        assert_eq!(object.get_or_default::<Scope>().unwrap(), Scope::default());
        assert!(object.get::<Scope>().parsing_error().is_err());

        object.insert_raw("scope", json!(42));
        assert!(object.get::<Scope>().unwrap().is_err());
        assert!(UntypedObject::try_from(json!([1])).is_err());
    }
}
