//! Postgres (de)serialization for the crate's "string enum" columns.
//!
//! Status/severity/channel columns are plain `VARCHAR`, not native
//! Postgres enum types. This macro
//! wires `sqlx::Type`/`Encode`/`Decode` through each enum's existing
//! `Display`/`parse`-style conversions so `#[derive(FromRow)]` keeps
//! working directly on the domain structs.

#[macro_export]
macro_rules! impl_pg_string_enum {
    ($ty:ty, $parse:expr) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <String as sqlx::Encode<sqlx::Postgres>>::encode(self.to_string(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                let parser: fn(&str) -> Option<$ty> = $parse;
                parser(raw).ok_or_else(|| format!("invalid value for {}: {}", stringify!($ty), raw).into())
            }
        }
    };
}
