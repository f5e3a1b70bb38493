/// Declares typed procedure descriptors for [`Client::execute`](crate::Client::execute)
/// and [`Client::subscribe`](crate::Client::subscribe).
///
/// Each line reads `kind Name("key"): Input => Output;` where kind is
/// `query`, `mutation` or `subscription`. Every descriptor is a unit struct
/// implementing [`Procedure`](crate::client::Procedure).
///
/// ```rust,ignore
/// rspc::procedures! {
///     /// The server version.
///     pub query Version("version"): () => String;
///     pub mutation AddUser("users.add"): NewUser => User;
///     pub subscription Pings("pings"): u32 => String;
/// }
/// ```
#[macro_export]
macro_rules! procedures {
    (@kind query) => { $crate::client::kind::Query };
    (@kind mutation) => { $crate::client::kind::Mutation };
    (@kind subscription) => { $crate::client::kind::Subscription };
    ($(
        $(#[$meta:meta])*
        $vis:vis $kind:ident $name:ident($key:literal): $input:ty => $output:ty;
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default)]
            $vis struct $name;

            impl $crate::client::Procedure for $name {
                const KEY: &'static str = $key;
                type Kind = $crate::procedures!(@kind $kind);
                type Input = $input;
                type Output = $output;
            }
        )*
    };
}
