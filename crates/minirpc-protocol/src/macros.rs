//! Service declaration macro.

/// Declares an RPC service once for both sides of the wire.
///
/// ```text
/// rpc_service! {
///     pub service Users("UserService") => UserClient, UserHandler {
///         rpc get_user(u32) -> User;
///         rpc rename(Rename) -> ();
///     }
/// }
/// ```
///
/// expands to:
///
/// - `struct Users` carrying the wire name as `Users::NAME`;
/// - `struct UserClient` with one public [`Stub`](crate::Stub) field per
///   method, implementing [`ClientService`](crate::ClientService) so that a
///   client can bind every stub at once;
/// - `trait UserHandler` with one async method per `rpc` line plus a provided
///   `into_service` that builds the [`ServiceDescriptor`](crate::ServiceDescriptor)
///   a server registers.
///
/// Method names on the wire are the Rust identifiers.
#[macro_export]
macro_rules! rpc_service {
    (
        $(#[$attr:meta])*
        $vis:vis service $service:ident($name:literal) => $client:ident, $handler:ident {
            $(
                $(#[$method_attr:meta])*
                rpc $method:ident($req:ty) -> $resp:ty;
            )*
        }
    ) => {
        $(#[$attr])*
        $vis struct $service;

        impl $service {
            pub const NAME: &'static str = $name;
        }

        #[derive(Debug, Clone)]
        $vis struct $client {
            $(
                $(#[$method_attr])*
                pub $method: $crate::Stub<$req, $resp>,
            )*
        }

        impl ::core::default::Default for $client {
            fn default() -> Self {
                Self {
                    $( $method: $crate::Stub::unbound($name, ::core::stringify!($method)), )*
                }
            }
        }

        impl $crate::ClientService for $client {
            fn service_name(&self) -> &str {
                $name
            }

            fn method_names(&self) -> ::std::vec::Vec<&str> {
                ::std::vec![$( ::core::stringify!($method) ),*]
            }

            #[allow(unused_variables)]
            fn bind(&mut self, proxy: ::std::sync::Arc<dyn $crate::Proxy>) {
                $( self.$method.bind(::std::sync::Arc::clone(&proxy)); )*
            }
        }

        $vis trait $handler: ::core::marker::Send + ::core::marker::Sync + 'static {
            $(
                $(#[$method_attr])*
                fn $method(
                    &self,
                    ctx: $crate::CallContext,
                    req: $req,
                ) -> impl ::core::future::Future<
                    Output = ::core::result::Result<$resp, $crate::HandlerError>,
                > + ::core::marker::Send;
            )*

            /// Wraps this implementation into a registrable service.
            fn into_service(self) -> $crate::ServiceDescriptor
            where
                Self: Sized,
            {
                #[allow(unused_variables)]
                let this = ::std::sync::Arc::new(self);
                let descriptor = $crate::ServiceDescriptor::new($name);
                $(
                    let descriptor = {
                        let this = ::std::sync::Arc::clone(&this);
                        descriptor.method(
                            ::core::stringify!($method),
                            move |ctx: $crate::CallContext, req: $req| {
                                let this = ::std::sync::Arc::clone(&this);
                                async move { this.$method(ctx, req).await }
                            },
                        )
                    };
                )*
                descriptor
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{CallContext, ClientService, HandlerError, Serializer};

    rpc_service! {
        /// Arithmetic used by the macro tests.
        pub service Calc("calc") => CalcClient, CalcHandler {
            rpc add((i64, i64)) -> i64;
            rpc negate(i64) -> i64;
        }
    }

    struct CalcImpl;

    impl CalcHandler for CalcImpl {
        async fn add(&self, _ctx: CallContext, (a, b): (i64, i64)) -> Result<i64, HandlerError> {
            Ok(a + b)
        }

        async fn negate(&self, _ctx: CallContext, n: i64) -> Result<i64, HandlerError> {
            Ok(-n)
        }
    }

    #[test]
    fn client_starts_unbound() {
        let client = CalcClient::default();
        assert_eq!(Calc::NAME, "calc");
        assert_eq!(client.service_name(), "calc");
        assert_eq!(client.method_names(), vec!["add", "negate"]);
        assert!(!client.add.is_bound());
        assert_eq!(client.negate.service_name(), "calc");
        assert_eq!(client.negate.method_name(), "negate");
    }

    #[tokio::test]
    async fn handler_becomes_descriptor() {
        let descriptor = CalcImpl.into_service();
        assert_eq!(descriptor.name(), "calc");
        assert_eq!(descriptor.method_names(), vec!["add", "negate"]);

        let add = descriptor.method_handler("add").unwrap();
        let arg = Serializer::Json.encode(&(40i64, 2i64)).unwrap();
        let out = add(CallContext::new(), Serializer::Json, arg).await.unwrap();
        assert_eq!(Serializer::Json.decode::<i64>(&out).unwrap(), 42);
    }
}
